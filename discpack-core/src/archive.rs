use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Result of archiving one set part.
#[derive(Serialize, Clone, Debug)]
pub struct ArchiveReport {
    pub archive: PathBuf,
    pub success: bool,
    /// Diagnostic text from the archiver (its captured output).
    pub output: String,
}

/// Turns a list of files into one archive. Errors are reserved for failing
/// to run the archiver at all; a run that reports problems comes back as
/// `success == false`.
pub trait Archiver {
    fn archive(&self, archive: &Path, files: &[&Path]) -> io::Result<ArchiveReport>;
}

/// `arch<set>-<part>.<ext>` under `dest`.
pub fn archive_name(dest: &Path, set: usize, part: usize, ext: &str) -> PathBuf {
    dest.join(format!("arch{}-{}.{}", set, part, ext))
}

/// First archive name at or after `start` that does not exist yet, with the
/// set number that was used. Lets repeated runs into one destination carry
/// on numbering where the last run stopped.
pub fn next_free_archive(dest: &Path, start: usize, part: usize, ext: &str) -> (PathBuf, usize) {
    let mut n = start;
    loop {
        let candidate = archive_name(dest, n, part, ext);
        if !candidate.exists() {
            return (candidate, n);
        }
        tracing::debug!(archive = %candidate.display(), "archive exists, trying next number");
        n += 1;
    }
}
