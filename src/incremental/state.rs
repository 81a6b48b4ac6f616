use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EtlError, Result};
use crate::output::write_json;
use crate::record::{BatchOperationRecord, MergeKey};

/// Persisted high-water mark and published keys of one source system.
///
/// Stored as:
/// ```json
/// {
///   "high_water_mark": "2025-01-15T16:00:00",
///   "known_keys": [["B001", "数控铣"], ["B001", "清洗"]]
/// }
/// ```
/// Keys are kept sorted and no run timestamp is stored, so a rerun that
/// changes nothing rewrites an identical file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalState {
    pub high_water_mark: Option<NaiveDateTime>,
    #[serde(default)]
    pub known_keys: BTreeSet<MergeKey>,
}

impl IncrementalState {
    /// Reads the state at `path`; a missing file is an empty state.
    ///
    /// A file that exists but does not parse fails the run instead of being
    /// treated as empty, which would silently republish everything.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No prior state, starting fresh");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| EtlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state: IncrementalState =
            serde_json::from_str(&content).map_err(|source| EtlError::StateCorruption {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            known_keys = state.known_keys.len(),
            high_water_mark = ?state.high_water_mark,
            "Loaded incremental state"
        );
        Ok(state)
    }

    /// Atomically replaces the state file.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn is_empty(&self) -> bool {
        self.high_water_mark.is_none() && self.known_keys.is_empty()
    }

    pub fn is_known(&self, key: &MergeKey) -> bool {
        self.known_keys.contains(key)
    }

    /// State describing `dataset` after it has been published.
    ///
    /// The high-water mark never moves backwards.
    pub fn advance(&self, dataset: &[BatchOperationRecord]) -> IncrementalState {
        let newest = dataset.iter().filter_map(|r| r.track_out_time).max();
        let high_water_mark = match (self.high_water_mark, newest) {
            (Some(prev), Some(new)) => Some(prev.max(new)),
            (prev, new) => prev.or(new),
        };

        let known_keys: BTreeSet<MergeKey> = dataset.iter().map(|r| r.key()).collect();
        let dropped = self.known_keys.difference(&known_keys).count();
        if dropped > 0 {
            warn!(dropped, "Keys from the previous state are no longer in the dataset");
        }

        IncrementalState {
            high_water_mark,
            known_keys,
        }
    }
}
