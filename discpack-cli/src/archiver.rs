use discpack_core::archive::{ArchiveReport, Archiver};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Drives a 7-Zip compatible command line (`<prog> a -t<fmt> -mx<n> [-p<pwd>] <archive> <files>`).
pub struct SevenZip {
    pub program: PathBuf,
    pub format: String,
    pub compression: String,
    pub password: Option<String>,
}

impl SevenZip {
    fn command(&self, archive: &Path, files: &[&Path]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("a").arg(format!("-t{}", self.format)).arg(format!("-mx{}", self.compression));
        if let Some(pwd) = &self.password {
            cmd.arg(format!("-p{}", pwd));
        }
        cmd.arg(archive);
        cmd.args(files);
        cmd
    }
}

impl Archiver for SevenZip {
    fn archive(&self, archive: &Path, files: &[&Path]) -> io::Result<ArchiveReport> {
        info!(archive = %archive.display(), files = files.len(), "compressing file set");
        let out = self.command(archive, files).output()?;
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        debug!("archiver output:\n{}", text);

        let problem = if out.status.success() {
            diagnose(&text)
        } else {
            Some(format!("archiver exited with {}", out.status))
        };
        if let Some(p) = &problem {
            warn!(archive = %archive.display(), problem = %p, "archive failed");
        }
        Ok(ArchiveReport { archive: archive.to_path_buf(), success: problem.is_none(), output: text })
    }
}

/// Scan 7-Zip output for failure markers. `None` means it reported success.
pub fn diagnose(output: &str) -> Option<String> {
    let lower = output.to_ascii_lowercase();
    if let Some(n) = sub_item_errors(&lower) {
        if n > 0 {
            return Some(format!("{} sub item error(s)", n));
        }
    }
    if lower.contains("crc failed") {
        return Some("CRC failed".to_string());
    }
    if lower.contains("system error:") {
        return Some("system error".to_string());
    }
    if let Some(pos) = lower.find("duplicate filename:") {
        let rest = output[pos + "duplicate filename:".len()..].trim();
        let first = rest.lines().next().unwrap_or_default();
        return Some(format!("duplicate filename: {}", first));
    }
    if !lower.contains("everything is ok") {
        return Some("no success marker in archiver output".to_string());
    }
    None
}

fn sub_item_errors(lower: &str) -> Option<u64> {
    let marker = "sub items errors:";
    let pos = lower.find(marker)?;
    let digits: String = lower[pos + marker.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// File extension matching an archive format name.
pub fn extension_for(format: &str) -> &str {
    match format {
        "gzip" => "gz",
        "bzip2" => "bz2",
        other => other,
    }
}
