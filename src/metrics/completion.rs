//! OnTime / Overdue classification.

use crate::metrics::utility::truthy;
use crate::record::{BatchOperationRecord, CompletionStatus};

/// Changeover allowance in hours when the batch had no recorded setup.
pub const DEFAULT_CHANGEOVER_H: f64 = 0.5;

/// Changeover hours granted on top of ST and tolerance.
pub fn changeover_hours(setup_flag: Option<&str>, setup_time_h: Option<f64>) -> f64 {
    match setup_flag {
        Some("Yes") => truthy(setup_time_h).unwrap_or(DEFAULT_CHANGEOVER_H),
        _ => DEFAULT_CHANGEOVER_H,
    }
}

/// Classifies a batch from its PT and ST.
///
/// | Condition                                       | Result    |
/// |-------------------------------------------------|-----------|
/// | PT or ST missing / NaN                          | `None`    |
/// | `PT*24 > ST*24 + tolerance + changeover`        | `Overdue` |
/// | otherwise (equality included)                   | `OnTime`  |
///
/// Due dates play no part in the decision.
pub fn classify(
    pt_days: Option<f64>,
    st_days: Option<f64>,
    tolerance_h: f64,
    setup_flag: Option<&str>,
    setup_time_h: Option<f64>,
) -> Option<CompletionStatus> {
    let pt = pt_days.filter(|v| !v.is_nan())?;
    let st = st_days.filter(|v| !v.is_nan())?;

    let threshold_h = st * 24.0 + tolerance_h + changeover_hours(setup_flag, setup_time_h);
    if pt * 24.0 > threshold_h {
        Some(CompletionStatus::Overdue)
    } else {
        Some(CompletionStatus::OnTime)
    }
}

/// Classifies a record from its already derived PT and ST.
pub fn classify_record(record: &BatchOperationRecord) -> CompletionStatus {
    classify(
        record.pt_days,
        record.st_days,
        record.tolerance_h,
        record.setup.as_deref(),
        record.setup_time_h,
    )
    .unwrap_or(CompletionStatus::Unknown)
}
