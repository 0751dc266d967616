use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::bucket::FileEntry;
use crate::error::{PackError, Result};

/// A capacity-bounded, insertion-ordered group of files.
///
/// `total_size()` is always the sum of member sizes and never exceeds
/// `capacity()`.
#[derive(Serialize, Clone, Debug)]
pub struct FileSet {
    capacity: u64,
    size: u64,
    files: Vec<FileEntry>,
    #[serde(skip)]
    members: HashSet<PathBuf>,
}

impl FileSet {
    pub fn new(capacity: u64) -> Self {
        Self { capacity, size: 0, files: Vec::new(), members: HashSet::new() }
    }

    /// Append a file if there is room for it.
    pub fn add(&mut self, path: impl Into<PathBuf>, size: u64) -> Result<()> {
        let path = path.into();
        let requested = self.size.saturating_add(size);
        if requested > self.capacity {
            return Err(PackError::CapacityExceeded { requested, capacity: self.capacity });
        }
        if self.members.contains(&path) {
            return Err(PackError::DuplicatePath(path));
        }
        self.members.insert(path.clone());
        self.files.push(FileEntry { path, size });
        self.size = requested;
        Ok(())
    }

    /// Remove the most recently added file.
    pub fn pop(&mut self) -> Result<FileEntry> {
        let entry = self.files.pop().ok_or(PackError::EmptySet)?;
        self.members.remove(&entry.path);
        self.size -= entry.size;
        Ok(entry)
    }

    /// Move the last `count` members (LIFO) into a new set of `capacity`.
    ///
    /// On failure `self` is left exactly as it was.
    pub fn split_off(&mut self, count: usize, capacity: u64) -> Result<FileSet> {
        if count > self.files.len() {
            return Err(PackError::EmptySet);
        }
        let mut subset = FileSet::new(capacity);
        let mut popped = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = self.pop()?;
            let added = subset.add(entry.path.clone(), entry.size);
            popped.push(entry);
            if let Err(e) = added {
                self.restore(popped);
                return Err(e);
            }
        }
        Ok(subset)
    }

    fn restore(&mut self, mut popped: Vec<FileEntry>) {
        while let Some(entry) = popped.pop() {
            self.size += entry.size;
            self.members.insert(entry.path.clone());
            self.files.push(entry);
        }
    }

    pub fn file_names(&self) -> Vec<&Path> {
        self.files.iter().map(|e| e.path.as_path()).collect()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn member_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_size(&self) -> u64 {
        self.size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.size
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kb = self.size / 1024;
        let mb = kb as f64 / 1024.0;
        let gb = mb / 1024.0;
        writeln!(
            f,
            "Files ({}, {} bytes / {} KB / {:.2} MB / {:.2} GB):",
            self.files.len(),
            self.size,
            kb,
            mb,
            gb
        )?;
        for e in &self.files {
            writeln!(f, "\t{} ({})", e.path.display(), e.size)?;
        }
        Ok(())
    }
}
