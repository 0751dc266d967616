//! Packing configuration, loadable from TOML.
//!
//! ```toml
//! [pack]
//! bucket_granularity = 104857600
//! primary_capacity = 4617089843
//! secondary_capacity = 4294967296
//! split = true
//! split_strategy = "bisect"
//! max_sets = 3
//! pace_ms = 100
//!
//! [log]
//! level = "debug"
//! file = "discpack.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bucket::{BucketIndex, DEFAULT_GRANULARITY};
use crate::error::{PackError, Result};
use crate::split::SplitStrategy;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Usable bytes on a single-layer DVD, rounded down to 4.3 GiB.
pub const SINGLE_LAYER_DVD_BYTES: u64 = 4_617_089_843;

/// Largest archive most zip tools handle reliably.
pub const ZIP_MAX_BYTES: u64 = 4 * GIB;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PackConfig {
    pub pack: PackSection,
    pub log: LogSection,
}

/// `[pack]` section.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PackSection {
    pub bucket_granularity: u64,
    /// Capacity every packed set stays strictly under.
    pub primary_capacity: u64,
    /// Ceiling applied by the split pass.
    pub secondary_capacity: u64,
    /// Run the split pass at all.
    pub split: bool,
    pub split_strategy: SplitStrategy,
    /// Stop after this many sets; remaining files are reported unpacked.
    pub max_sets: Option<usize>,
    /// Delay between packer steps, in milliseconds.
    pub pace_ms: u64,
}

impl Default for PackSection {
    fn default() -> Self {
        Self {
            bucket_granularity: DEFAULT_GRANULARITY,
            primary_capacity: SINGLE_LAYER_DVD_BYTES,
            secondary_capacity: ZIP_MAX_BYTES,
            split: true,
            split_strategy: SplitStrategy::Bisect,
            max_sets: None,
            pace_ms: 0,
        }
    }
}

impl PackSection {
    /// The split ceiling, or `None` when the split pass is disabled.
    pub fn secondary(&self) -> Option<u64> {
        self.split.then_some(self.secondary_capacity)
    }

    /// An empty index using this section's granularity.
    pub fn new_index(&self) -> Result<BucketIndex> {
        BucketIndex::new(self.bucket_granularity)
    }
}

/// `[log]` section.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LogSection {
    /// Filter directive (e.g. `"info"`, `"discpack_core=debug"`).
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

impl PackConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reject values no packing run can work with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pack;
        if p.bucket_granularity == 0 {
            return Err(PackError::InvalidConfig("bucket_granularity must be non-zero".into()));
        }
        if p.primary_capacity == 0 {
            return Err(PackError::InvalidConfig("primary_capacity must be non-zero".into()));
        }
        if p.split && p.secondary_capacity == 0 {
            return Err(PackError::InvalidConfig(
                "secondary_capacity must be non-zero when split is enabled".into(),
            ));
        }
        if p.max_sets == Some(0) {
            return Err(PackError::InvalidConfig("max_sets must be at least 1".into()));
        }
        Ok(())
    }
}
