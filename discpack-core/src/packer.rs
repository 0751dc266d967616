use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::bucket::BucketIndex;
use crate::fileset::FileSet;
use crate::pacing::{NoPacing, Pacer};
use crate::size::SizeQuery;

/// Why a file was passed over without being placed or removed.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    NegativeSize { reported: i64 },
    QueryFailed { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NegativeSize { reported } => write!(f, "size query returned {}", reported),
            SkipReason::QueryFailed { message } => write!(f, "size query failed: {}", message),
        }
    }
}

/// A file the packer left in its bucket because its size could not be trusted.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub bucket: u64,
    /// Size recorded when the file was indexed.
    pub size: u64,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct PackOutcome {
    pub set: FileSet,
    pub skipped: Vec<SkippedEntry>,
}

/// Best-fit-by-bucket packer.
///
/// Buckets are visited largest first. Inside a bucket files are taken front
/// to back while `size + running < target`; the first file that does not fit
/// ends the bucket and the walk drops to the next smaller bucket.
pub struct Packer<'a> {
    sizes: &'a dyn SizeQuery,
    pacer: &'a dyn Pacer,
}

impl<'a> Packer<'a> {
    pub fn new(sizes: &'a dyn SizeQuery) -> Self {
        Self { sizes, pacer: &NoPacing }
    }

    pub fn with_pacer(mut self, pacer: &'a dyn Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Fill one set of capacity `target`, removing every placed file from `index`.
    pub fn fit(&self, index: &mut BucketIndex, target: u64) -> PackOutcome {
        let mut set = FileSet::new(target);
        let mut running: u64 = 0;
        let mut skipped = Vec::new();

        for key in index.sorted_bucket_keys() {
            debug!(bucket = key, "processing bucket");
            let mut pos = 0usize;
            while let Some(entry) = index.bucket(key).and_then(|b| b.get(pos)).cloned() {
                let size = match self.sizes.size_of(&entry.path) {
                    Ok(s) if s >= 0 => s as u64,
                    Ok(s) => {
                        warn!(path = %entry.path.display(), reported = s, "negative size, skipping");
                        skipped.push(SkippedEntry {
                            path: entry.path,
                            bucket: key,
                            size: entry.size,
                            reason: SkipReason::NegativeSize { reported: s },
                        });
                        pos += 1;
                        self.pacer.between_files();
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %entry.path.display(), error = %e, "size query failed, skipping");
                        skipped.push(SkippedEntry {
                            path: entry.path,
                            bucket: key,
                            size: entry.size,
                            reason: SkipReason::QueryFailed { message: e.to_string() },
                        });
                        pos += 1;
                        self.pacer.between_files();
                        continue;
                    }
                };

                debug!(path = %entry.path.display(), size, running, target, "considering file");
                if running.saturating_add(size) >= target {
                    debug!(bucket = key, "dropping down to next bucket");
                    break;
                }
                match set.add(entry.path.clone(), size) {
                    Ok(()) => {
                        running += size;
                        index.remove_at(key, pos);
                        debug!(path = %entry.path.display(), "added to set and removed from bucket");
                    }
                    Err(e) => {
                        // Leave it in the bucket for a later set.
                        debug!(path = %entry.path.display(), error = %e, "not placed");
                        pos += 1;
                    }
                }
                self.pacer.between_files();
            }
            self.pacer.between_buckets();
        }

        info!(files = set.member_count(), bytes = running, target, "fitted file set");
        PackOutcome { set, skipped }
    }
}
