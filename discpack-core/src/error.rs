//! Error types for packing operations.

use std::path::PathBuf;

/// Errors raised by file sets, the split pass and configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Adding a file would push a set past its capacity.
    #[error("current size of {requested} is bigger than the max size of {capacity}")]
    CapacityExceeded {
        /// Size the set would reach with the file added.
        requested: u64,
        /// Capacity of the set.
        capacity: u64,
    },

    /// `pop` was called on a set without members.
    #[error("cannot pop from an empty file set")]
    EmptySet,

    /// The path is already a member of the set.
    #[error("path already in file set: {}", .0.display())]
    DuplicatePath(PathBuf),

    /// A configuration value violates a hard requirement.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PackError>;
