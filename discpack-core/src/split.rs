//! Secondary split pass for sets heavier than a downstream ceiling.
//!
//! A packed set whose total reaches the ceiling is cut in two: the last
//! `floor(n / 2)` members move (LIFO) into a fresh subset. The cut is by
//! count, not bytes, so a heavy half can still reach the ceiling; such parts
//! are reported in [`SplitOutcome::over_ceiling`] rather than accepted
//! silently. [`SplitStrategy::Halving`] keeps cutting such parts instead.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PackError, Result};
use crate::fileset::FileSet;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// One bisection at most.
    #[default]
    Bisect,
    /// Bisect repeatedly until every part is under the ceiling or holds a
    /// single file.
    Halving,
}

#[derive(Debug)]
pub struct SplitOutcome {
    pub parts: Vec<FileSet>,
    /// Indices into `parts` whose total is still at or above the ceiling.
    pub over_ceiling: Vec<usize>,
}

/// Pop `floor(n / 2)` members of `set` into a new subset of capacity `ceiling`.
///
/// Fails with `CapacityExceeded` (leaving `set` untouched) when the moved
/// half does not fit under `ceiling`.
pub fn bisect(set: &mut FileSet, ceiling: u64) -> Result<FileSet> {
    let half = set.member_count() / 2;
    set.split_off(half, ceiling)
}

#[derive(Clone, Copy, Debug)]
pub struct Splitter {
    ceiling: u64,
    strategy: SplitStrategy,
}

impl Splitter {
    pub fn new(ceiling: u64, strategy: SplitStrategy) -> Result<Self> {
        if ceiling == 0 {
            return Err(PackError::InvalidConfig("secondary capacity must be non-zero".into()));
        }
        Ok(Self { ceiling, strategy })
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn needs_split(&self, set: &FileSet) -> bool {
        set.total_size() >= self.ceiling
    }

    pub fn split(&self, set: FileSet) -> Result<SplitOutcome> {
        let mut parts = Vec::new();
        if !self.needs_split(&set) {
            parts.push(set);
        } else {
            debug!(
                bytes = set.total_size(),
                ceiling = self.ceiling,
                "set reaches the secondary ceiling; splitting"
            );
            match self.strategy {
                SplitStrategy::Bisect => self.bisect_once(set, &mut parts)?,
                SplitStrategy::Halving => self.halve(set, &mut parts)?,
            }
        }

        let over_ceiling: Vec<usize> = parts
            .iter()
            .enumerate()
            .filter(|(_, p)| self.needs_split(p))
            .map(|(i, _)| i)
            .collect();
        for &i in &over_ceiling {
            warn!(
                part = i,
                bytes = parts[i].total_size(),
                ceiling = self.ceiling,
                "part is still at or above the secondary ceiling"
            );
        }
        Ok(SplitOutcome { parts, over_ceiling })
    }

    fn bisect_once(&self, mut set: FileSet, parts: &mut Vec<FileSet>) -> Result<()> {
        let subset = match bisect(&mut set, self.ceiling) {
            Ok(subset) => subset,
            Err(PackError::CapacityExceeded { requested, .. }) => {
                warn!(requested, ceiling = self.ceiling, "moved half exceeds the ceiling");
                let half = set.member_count() / 2;
                let capacity = set.capacity();
                set.split_off(half, capacity)?
            }
            Err(e) => return Err(e),
        };
        parts.push(set);
        if !subset.is_empty() {
            parts.push(subset);
        }
        Ok(())
    }

    fn halve(&self, mut set: FileSet, parts: &mut Vec<FileSet>) -> Result<()> {
        if !self.needs_split(&set) || set.member_count() < 2 {
            parts.push(set);
            return Ok(());
        }
        let half = set.member_count() / 2;
        let capacity = set.capacity();
        let subset = set.split_off(half, capacity)?;
        self.halve(set, parts)?;
        self.halve(subset, parts)
    }
}
