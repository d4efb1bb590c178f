//! Source tree inspection: exclusion rules, walking and size analysis.

pub mod exclude;
pub mod metadata;
pub mod size;
pub mod walker;

pub use exclude::{should_exclude, ExclusionMatcher};
pub use metadata::{EntryKind, FileMetadata};
pub use size::{analyze, list_large, LargeFile, SizeSummary, RECOMMENDED_MAX_FILE_SIZE};
pub use walker::{walk_tree, FileInfo, WalkOptions};
