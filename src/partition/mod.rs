//! Partitioned publication of the merged dataset.
//!
//! Two layouts exist: `flat` (one file per track-out day) and `layered`
//! (hot/warm/cold tiers by recency). Both write bucket files through
//! [`writer::PartitionWriter`], then replace a JSON manifest, then prune
//! buckets the manifest no longer lists. A Power Query template that reads
//! the manifest is written alongside.

pub mod flat;
pub mod layered;
pub mod powerbi;
pub mod types;
pub mod writer;

/// Bucket key for rows without a track-out time.
pub const UNDATED: &str = "undated";
