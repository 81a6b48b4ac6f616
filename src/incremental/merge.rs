use std::collections::HashMap;

use crate::incremental::IncrementalState;
use crate::record::{BatchOperationRecord, MergeKey};

/// Splits freshly derived records into `(new, unchanged)`.
///
/// A record is new when its key has never been published or its track-out
/// is later than the high-water mark.
pub fn filter_new(
    records: Vec<BatchOperationRecord>,
    state: &IncrementalState,
) -> (Vec<BatchOperationRecord>, Vec<BatchOperationRecord>) {
    records.into_iter().partition(|record| {
        if !state.is_known(&record.key()) {
            return true;
        }
        match (record.track_out_time, state.high_water_mark) {
            (Some(track_out), Some(mark)) => track_out > mark,
            (Some(_), None) => true,
            (None, _) => false,
        }
    })
}

/// Overlays `new_records` onto `existing`, last write wins per key.
///
/// Existing rows keep their position; a new row with a known key replaces
/// it in place and unseen keys are appended in input order. The result holds
/// each `(BatchNumber, Operation)` exactly once.
pub fn merge(
    existing: Vec<BatchOperationRecord>,
    new_records: Vec<BatchOperationRecord>,
) -> Vec<BatchOperationRecord> {
    let mut merged: Vec<BatchOperationRecord> =
        Vec::with_capacity(existing.len() + new_records.len());
    let mut index: HashMap<MergeKey, usize> = HashMap::new();

    for record in existing.into_iter().chain(new_records) {
        match index.get(&record.key()) {
            Some(&pos) => merged[pos] = record,
            None => {
                index.insert(record.key(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}
