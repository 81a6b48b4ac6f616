//! Incremental processing across runs.
//!
//! [`IncrementalState`] remembers the newest track-out seen and every merge
//! key already published, so a rerun only replaces rows that changed.
//! One state file exists per source system and is replaced atomically at
//! the end of a successful run.

mod merge;
mod state;

pub use merge::{filter_new, merge};
pub use state::IncrementalState;
