//! Standard time (ST): the allowed duration for a batch in days.
//!
//! `base_hours = setup + (qty * unit_seconds / 3600) / OEE + 0.5`, where
//! `qty = TrackOutQuantity + ScrapQuantity` and the trailing half hour is the
//! inter-batch changeover allowance. MES and SFC share this formula.

use crate::metrics::Unavailable;
use crate::metrics::utility::{positive, round2};
use crate::record::BatchOperationRecord;

/// Inter-batch changeover allowance added to every batch, in hours.
pub const BATCH_CHANGEOVER_H: f64 = 0.5;

/// Quantity basis: good parts plus scrap. Negative counts contribute nothing.
pub fn quantity(record: &BatchOperationRecord) -> f64 {
    record.track_out_quantity.max(0.0) + record.scrap_quantity.max(0.0)
}

/// Per-unit cycle time in seconds; machine time wins over labor time.
pub fn unit_time_seconds(record: &BatchOperationRecord) -> Option<f64> {
    positive(record.eh_machine_s).or_else(|| positive(record.eh_labor_s))
}

/// Setup hours charged to the batch: the recorded setup time when the batch
/// needed a setup, nothing otherwise.
pub fn setup_hours(record: &BatchOperationRecord) -> f64 {
    if record.is_setup() {
        positive(record.setup_time_h).unwrap_or(0.0)
    } else {
        0.0
    }
}

/// Standard time in days, or why it cannot be computed.
pub fn standard_time(record: &BatchOperationRecord) -> Result<f64, Unavailable> {
    let unit_s = unit_time_seconds(record).ok_or(Unavailable::MissingInput)?;

    let run_hours = quantity(record) * (unit_s / 3600.0) / record.oee;
    let base_hours = setup_hours(record) + run_hours + BATCH_CHANGEOVER_H;

    if base_hours <= 0.0 || !base_hours.is_finite() {
        return Err(Unavailable::MissingInput);
    }
    Ok(round2(base_hours / 24.0))
}

/// ST in days, `None` when undefined.
pub fn compute_st(record: &BatchOperationRecord) -> Option<f64> {
    standard_time(record).ok()
}
