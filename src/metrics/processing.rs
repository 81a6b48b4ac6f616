//! Processing time (PT): elapsed active processing in days.

use chrono::NaiveDateTime;

use crate::metrics::Unavailable;
use crate::metrics::utility::round2;
use crate::record::BatchOperationRecord;

const SECONDS_PER_DAY: f64 = 3600.0 * 24.0;

/// Processing time in days, or why it cannot be computed.
///
/// A track-out at or before the resolved start is an invalid interval, not a
/// zero-length one.
pub fn processing_time(
    record: &BatchOperationRecord,
    resolved_start: Option<NaiveDateTime>,
) -> Result<f64, Unavailable> {
    let (Some(track_out), Some(start)) = (record.track_out_time, resolved_start) else {
        return Err(Unavailable::MissingInput);
    };
    if track_out <= start {
        return Err(Unavailable::InvalidInterval);
    }

    let seconds = (track_out - start).num_milliseconds() as f64 / 1000.0;
    Ok(round2(seconds / SECONDS_PER_DAY))
}

/// PT in days, `None` when undefined.
pub fn compute_pt(
    record: &BatchOperationRecord,
    resolved_start: Option<NaiveDateTime>,
) -> Option<f64> {
    processing_time(record, resolved_start).ok()
}
