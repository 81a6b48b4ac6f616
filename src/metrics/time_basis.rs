//! Start-of-work resolution.
//!
//! In continuous production a batch starts when the previous batch on the
//! equipment ends. When the equipment sat idle in between (a production
//! gap), the idle period must not count as processing time, so the start
//! moves to the moment work was actually checked in.

use chrono::NaiveDateTime;

use crate::record::{BatchOperationRecord, StartField};

/// Which timestamp the resolved start came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBasis {
    PreviousBatchEnd,
    /// The source-specific check-in column (`TrackInTime` or `Checkin_SFC`).
    CheckIn,
}

/// Outcome of start-of-work resolution for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStart {
    pub start: Option<NaiveDateTime>,
    pub basis: Option<StartBasis>,
    pub production_gap: bool,
}

/// Returns `true` when the step was entered after the previous batch ended.
///
/// Strict comparison with no minimum gap: one second is enough.
pub fn has_production_gap(record: &BatchOperationRecord) -> bool {
    match (record.enter_step_time, record.previous_batch_end_time) {
        (Some(enter), Some(prev_end)) => enter > prev_end,
        _ => false,
    }
}

/// Picks the timestamp that marks the start of active processing.
///
/// `fallback` names the column holding the check-in time of the record's
/// source system; it is the only thing that differs between MES and SFC.
pub fn resolve_start(record: &BatchOperationRecord, fallback: StartField) -> ResolvedStart {
    let production_gap = has_production_gap(record);
    let check_in = record
        .start_field(fallback)
        .map(|t| (t, StartBasis::CheckIn));
    let prev_end = record
        .previous_batch_end_time
        .map(|t| (t, StartBasis::PreviousBatchEnd));

    let chosen = if production_gap {
        check_in.or(prev_end)
    } else {
        prev_end.or(check_in)
    };

    ResolvedStart {
        start: chosen.map(|(t, _)| t),
        basis: chosen.map(|(_, b)| b),
        production_gap,
    }
}
