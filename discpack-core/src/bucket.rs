use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{PackError, Result};

/// Default bucket width: 100 MiB.
pub const DEFAULT_GRANULARITY: u64 = 100 * 1024 * 1024;

/// A file path paired with the size it had when it was indexed.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self { path: path.into(), size }
    }
}

/// Files grouped by size rounded down to a multiple of the granularity.
///
/// Buckets never stay empty: removing the last member drops the bucket, so
/// `is_empty()` doubles as "no files left". A path is indexed at most once.
#[derive(Clone, Debug)]
pub struct BucketIndex {
    granularity: u64,
    buckets: BTreeMap<u64, Vec<FileEntry>>,
    paths: HashSet<PathBuf>,
}

impl BucketIndex {
    pub fn new(granularity: u64) -> Result<Self> {
        if granularity == 0 {
            return Err(PackError::InvalidConfig("bucket granularity must be non-zero".into()));
        }
        Ok(Self { granularity, buckets: BTreeMap::new(), paths: HashSet::new() })
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    /// Floor of `size` to the bucket grid. Sizes below one granularity unit
    /// land in bucket 0.
    pub fn bucket_key(&self, size: u64) -> u64 {
        size - (size % self.granularity)
    }

    /// Index a file. Returns `false`, leaving the index unchanged, when the
    /// path is already indexed.
    pub fn add(&mut self, path: impl Into<PathBuf>, size: u64) -> bool {
        let key = self.bucket_key(size);
        let entry = FileEntry::new(path, size);
        if !self.paths.insert(entry.path.clone()) {
            tracing::warn!(path = %entry.path.display(), "already indexed, ignoring duplicate");
            return false;
        }
        tracing::trace!(path = %entry.path.display(), size, bucket = key, "indexed file");
        self.buckets.entry(key).or_default().push(entry);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Bucket keys, largest first.
    pub fn sorted_bucket_keys(&self) -> Vec<u64> {
        self.buckets.keys().rev().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of files still indexed.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Sum of the indexed sizes of every remaining file.
    pub fn total_bytes(&self) -> u64 {
        self.buckets.values().flatten().map(|e| e.size).sum()
    }

    /// Members of one bucket in insertion order.
    pub fn bucket(&self, key: u64) -> Option<&[FileEntry]> {
        self.buckets.get(&key).map(Vec::as_slice)
    }

    /// Remaining entries, largest bucket first, insertion order within a bucket.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &FileEntry)> + '_ {
        self.buckets.iter().rev().flat_map(|(k, v)| v.iter().map(move |e| (*k, e)))
    }

    /// Remove the first member of `key` whose path is `path`.
    pub fn remove_file(&mut self, key: u64, path: &Path) -> Option<FileEntry> {
        let pos = self.buckets.get(&key)?.iter().position(|e| e.path == path)?;
        self.remove_at(key, pos)
    }

    pub(crate) fn remove_at(&mut self, key: u64, pos: usize) -> Option<FileEntry> {
        let bucket = self.buckets.get_mut(&key)?;
        if pos >= bucket.len() {
            return None;
        }
        let entry = bucket.remove(pos);
        self.paths.remove(&entry.path);
        if bucket.is_empty() {
            self.buckets.remove(&key);
            tracing::debug!(bucket = key, "removed bucket");
        }
        Some(entry)
    }

    /// Empty the index, returning what was left in `entries()` order.
    pub fn drain_remaining(&mut self) -> Vec<FileEntry> {
        self.paths.clear();
        let buckets = std::mem::take(&mut self.buckets);
        buckets.into_iter().rev().flat_map(|(_, v)| v).collect()
    }
}

impl Default for BucketIndex {
    fn default() -> Self {
        Self { granularity: DEFAULT_GRANULARITY, buckets: BTreeMap::new(), paths: HashSet::new() }
    }
}
