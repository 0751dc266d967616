use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::bucket::{BucketIndex, FileEntry};
use crate::config::PackSection;
use crate::error::Result;
use crate::fileset::FileSet;
use crate::pacing::{NoPacing, Pacer};
use crate::packer::{Packer, SkippedEntry};
use crate::size::SizeQuery;
use crate::split::Splitter;

/// Why a file ended up in no set.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnpackedReason {
    /// At least as large as the primary capacity.
    TooLarge,
    /// The configured set limit was reached first.
    SetLimit,
    /// Left over when a pass could place nothing else.
    Stalled,
}

#[derive(Serialize, Clone, Debug)]
pub struct UnpackedEntry {
    pub path: PathBuf,
    pub size: u64,
    pub reason: UnpackedReason,
}

/// One packing pass: the packed set, possibly cut into several parts.
#[derive(Serialize, Debug)]
pub struct PlannedSet {
    pub number: usize,
    pub total_size: u64,
    pub parts: Vec<FileSet>,
    /// Indices into `parts` still at or above the secondary ceiling.
    pub over_ceiling: Vec<usize>,
}

#[derive(Serialize, Debug)]
pub struct PackPlan {
    pub created_utc: String,
    pub bucket_granularity: u64,
    pub primary_capacity: u64,
    pub secondary_capacity: Option<u64>,
    pub input_files: usize,
    pub input_bytes: u64,
    pub sets: Vec<PlannedSet>,
    pub skipped: Vec<SkippedEntry>,
    pub unpacked: Vec<UnpackedEntry>,
}

impl PackPlan {
    pub fn packed_bytes(&self) -> u64 {
        self.sets.iter().map(|s| s.total_size).sum()
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.skipped.iter().map(|s| s.size).sum()
    }

    pub fn unpacked_bytes(&self) -> u64 {
        self.unpacked.iter().map(|u| u.size).sum()
    }

    /// Every indexed byte is accounted for exactly once.
    pub fn is_conserved(&self) -> bool {
        self.packed_bytes() + self.skipped_bytes() + self.unpacked_bytes() == self.input_bytes
    }

    pub fn part_count(&self) -> usize {
        self.sets.iter().map(|s| s.parts.len()).sum()
    }

    pub fn parts(&self) -> impl Iterator<Item = (usize, usize, &FileSet)> + '_ {
        self.sets
            .iter()
            .flat_map(|s| s.parts.iter().enumerate().map(move |(i, p)| (s.number, i + 1, p)))
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives the packer until the index is exhausted, then splits each set.
pub struct Planner<'a> {
    config: &'a PackSection,
    sizes: &'a dyn SizeQuery,
    pacer: &'a dyn Pacer,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a PackSection, sizes: &'a dyn SizeQuery) -> Self {
        Self { config, sizes, pacer: &NoPacing }
    }

    pub fn with_pacer(mut self, pacer: &'a dyn Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn plan(&self, mut index: BucketIndex) -> Result<PackPlan> {
        let target = self.config.primary_capacity;
        let splitter = match self.config.secondary() {
            Some(ceiling) => {
                if ceiling.saturating_mul(2) < target {
                    warn!(
                        ceiling,
                        target, "secondary capacity is under half the target; one split may not suffice"
                    );
                }
                Some(Splitter::new(ceiling, self.config.split_strategy)?)
            }
            None => None,
        };
        let packer = Packer::new(self.sizes).with_pacer(self.pacer);

        let input_files = index.len();
        let input_bytes = index.total_bytes();
        let mut packed: Vec<FileSet> = Vec::new();
        let mut skipped: Vec<SkippedEntry> = Vec::new();
        let mut seen_skipped: HashSet<PathBuf> = HashSet::new();
        let mut unpacked: Vec<UnpackedEntry> = Vec::new();
        let mut limit_hit = false;

        while !index.is_empty() {
            if self.config.max_sets.is_some_and(|max| packed.len() >= max) {
                info!(sets = packed.len(), "set limit reached");
                limit_hit = true;
                break;
            }
            let outcome = packer.fit(&mut index, target);
            for s in outcome.skipped {
                if seen_skipped.insert(s.path.clone()) {
                    skipped.push(s);
                }
            }
            if !outcome.set.is_empty() {
                info!(
                    set = packed.len() + 1,
                    files = outcome.set.member_count(),
                    bytes = outcome.set.total_size(),
                    "packed set"
                );
                debug!("set {}:\n{}", packed.len() + 1, outcome.set);
                packed.push(outcome.set);
                continue;
            }
            // Nothing fit: evict files too large for any set and try again.
            let evicted = self.evict_oversized(&mut index, target);
            if evicted.is_empty() {
                break;
            }
            unpacked.extend(evicted);
        }

        let leftover_reason = if limit_hit { UnpackedReason::SetLimit } else { UnpackedReason::Stalled };
        let remaining: HashSet<PathBuf> = index.entries().map(|(_, e)| e.path.clone()).collect();
        // A file skipped in one pass may have been placed in a later one.
        skipped.retain(|s| remaining.contains(&s.path));
        let still_skipped: HashSet<PathBuf> = skipped.iter().map(|s| s.path.clone()).collect();
        for e in index.drain_remaining() {
            if still_skipped.contains(&e.path) {
                continue;
            }
            unpacked.push(UnpackedEntry { path: e.path, size: e.size, reason: leftover_reason });
        }
        for s in &skipped {
            warn!(path = %s.path.display(), reason = %s.reason, "file skipped");
        }
        for u in &unpacked {
            warn!(path = %u.path.display(), size = u.size, reason = ?u.reason, "file not packed");
        }

        let mut sets = Vec::with_capacity(packed.len());
        for (i, set) in packed.into_iter().enumerate() {
            let total_size = set.total_size();
            let (parts, over_ceiling) = match &splitter {
                Some(sp) => {
                    let out = sp.split(set)?;
                    (out.parts, out.over_ceiling)
                }
                None => (vec![set], Vec::new()),
            };
            sets.push(PlannedSet { number: i + 1, total_size, parts, over_ceiling });
        }

        let plan = PackPlan {
            created_utc: chrono::Utc::now().to_rfc3339(),
            bucket_granularity: index.granularity(),
            primary_capacity: target,
            secondary_capacity: self.config.secondary(),
            input_files,
            input_bytes,
            sets,
            skipped,
            unpacked,
        };
        info!(
            sets = plan.sets.len(),
            parts = plan.part_count(),
            packed_bytes = plan.packed_bytes(),
            skipped = plan.skipped.len(),
            unpacked = plan.unpacked.len(),
            "plan complete"
        );
        Ok(plan)
    }

    fn evict_oversized(&self, index: &mut BucketIndex, target: u64) -> Vec<UnpackedEntry> {
        let oversized: Vec<(u64, FileEntry)> = index
            .entries()
            .filter(|(_, e)| matches!(self.sizes.size_of(&e.path), Ok(s) if s >= 0 && s as u64 >= target))
            .map(|(k, e)| (k, e.clone()))
            .collect();
        let mut evicted = Vec::with_capacity(oversized.len());
        for (key, entry) in oversized {
            if let Some(e) = index.remove_file(key, &entry.path) {
                warn!(path = %e.path.display(), size = e.size, target, "file is too large for any set");
                evicted.push(UnpackedEntry { path: e.path, size: e.size, reason: UnpackedReason::TooLarge });
            }
        }
        evicted
    }
}
