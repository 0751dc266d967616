pub mod archive;
pub mod bucket;
pub mod config;
pub mod error;
pub mod fileset;
pub mod pacing;
pub mod packer;
pub mod plan;
pub mod size;
pub mod split;

pub use bucket::{BucketIndex, FileEntry};
pub use error::PackError;
pub use fileset::FileSet;
pub use packer::{PackOutcome, Packer, SkippedEntry};
pub use plan::{PackPlan, Planner};
