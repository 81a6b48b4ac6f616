//! Record types shared by every stage of the pipeline.
//!
//! [`RawRecord`] is one row exactly as it appears in a source extract.
//! [`BatchOperationRecord`] is the typed row the engine works on: defaults
//! are applied and the operation name is normalized once, when it is built.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EtlError;
use crate::metrics::operation::normalize;

/// OEE used when the extract has none (or an unusable one).
pub const DEFAULT_OEE: f64 = 0.77;

/// Grace period in hours used when the extract has no tolerance.
pub const DEFAULT_TOLERANCE_H: f64 = 8.0;

/// Identity of a row in the merged dataset.
pub type MergeKey = (String, String);

/// The two manufacturing execution systems feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    Mes,
    Sfc,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Mes => "mes",
            SourceSystem::Sfc => "sfc",
        }
    }

    /// Upper-case label used in published file names (`MES_data_...`).
    pub fn label(&self) -> &'static str {
        match self {
            SourceSystem::Mes => "MES",
            SourceSystem::Sfc => "SFC",
        }
    }

    /// Timestamp that marks "work actually began" in this system.
    pub fn default_start_field(&self) -> StartField {
        match self {
            SourceSystem::Mes => StartField::TrackIn,
            SourceSystem::Sfc => StartField::CheckinSfc,
        }
    }

    /// Required file name of this system's incremental state.
    pub fn state_file_name(&self) -> String {
        format!("etl_{}_state.json", self.as_str())
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceSystem {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mes" => Ok(SourceSystem::Mes),
            "sfc" => Ok(SourceSystem::Sfc),
            other => Err(EtlError::config(format!("unknown source system '{other}'"))),
        }
    }
}

/// Which timestamp column plays the fallback start-of-work role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartField {
    #[serde(rename = "TrackInTime")]
    TrackIn,
    #[serde(rename = "Checkin_SFC")]
    CheckinSfc,
}

impl StartField {
    pub fn column(&self) -> &'static str {
        match self {
            StartField::TrackIn => "TrackInTime",
            StartField::CheckinSfc => "Checkin_SFC",
        }
    }
}

/// Completion classification of a batch at an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    OnTime,
    Overdue,
    #[default]
    #[serde(alias = "")]
    Unknown,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::OnTime => "OnTime",
            CompletionStatus::Overdue => "Overdue",
            CompletionStatus::Unknown => "Unknown",
        }
    }
}

/// One row of a source extract, before any defaulting.
///
/// Numeric and timestamp cells are kept loose: a cell that does not parse is
/// treated as absent rather than rejecting the whole extract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "BatchNumber", default)]
    pub batch_number: Option<String>,
    #[serde(rename = "Operation", alias = "Step_Name", default)]
    pub operation: Option<String>,

    #[serde(rename = "TrackInTime", default)]
    pub track_in_time: Option<String>,
    #[serde(rename = "TrackOutTime", default)]
    pub track_out_time: Option<String>,
    #[serde(rename = "EnterStepTime", default)]
    pub enter_step_time: Option<String>,
    #[serde(rename = "PreviousBatchEndTime", default)]
    pub previous_batch_end_time: Option<String>,
    #[serde(rename = "Checkin_SFC", default)]
    pub checkin_sfc: Option<String>,
    #[serde(rename = "DueTime", default)]
    pub due_time: Option<String>,

    #[serde(rename = "TrackOutQuantity", default, deserialize_with = "lenient_f64")]
    pub track_out_quantity: Option<f64>,
    #[serde(rename = "ScrapQuantity", default, deserialize_with = "lenient_f64")]
    pub scrap_quantity: Option<f64>,
    #[serde(rename = "StepInQuantity", default, deserialize_with = "lenient_f64")]
    pub step_in_quantity: Option<f64>,

    #[serde(rename = "OEE", default, deserialize_with = "lenient_f64")]
    pub oee: Option<f64>,
    #[serde(rename = "Setup", default)]
    pub setup: Option<String>,
    #[serde(rename = "Setup Time (h)", default, deserialize_with = "lenient_f64")]
    pub setup_time_h: Option<f64>,
    #[serde(rename = "Tolerance(h)", default, deserialize_with = "lenient_f64")]
    pub tolerance_h: Option<f64>,
    #[serde(rename = "EH_machine(s)", default, deserialize_with = "lenient_f64")]
    pub eh_machine_s: Option<f64>,
    #[serde(rename = "EH_labor(s)", default, deserialize_with = "lenient_f64")]
    pub eh_labor_s: Option<f64>,
}

/// A batch at an operation, with derived time metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationRecord {
    #[serde(rename = "BatchNumber")]
    pub batch_number: String,
    #[serde(rename = "Operation")]
    pub operation: String,

    #[serde(rename = "TrackInTime", with = "naive_ts")]
    pub track_in_time: Option<NaiveDateTime>,
    #[serde(rename = "TrackOutTime", with = "naive_ts")]
    pub track_out_time: Option<NaiveDateTime>,
    #[serde(rename = "EnterStepTime", with = "naive_ts")]
    pub enter_step_time: Option<NaiveDateTime>,
    #[serde(rename = "PreviousBatchEndTime", with = "naive_ts")]
    pub previous_batch_end_time: Option<NaiveDateTime>,
    #[serde(rename = "Checkin_SFC", with = "naive_ts")]
    pub checkin_sfc: Option<NaiveDateTime>,
    /// Carried through for reference; never used for classification.
    #[serde(rename = "DueTime", with = "naive_ts")]
    pub due_time: Option<NaiveDateTime>,

    #[serde(rename = "TrackOutQuantity")]
    pub track_out_quantity: f64,
    #[serde(rename = "ScrapQuantity")]
    pub scrap_quantity: f64,
    /// Carried through for reference; never used as a quantity basis.
    #[serde(rename = "StepInQuantity")]
    pub step_in_quantity: Option<f64>,

    #[serde(rename = "OEE")]
    pub oee: f64,
    #[serde(rename = "Setup")]
    pub setup: Option<String>,
    #[serde(rename = "Setup Time (h)")]
    pub setup_time_h: Option<f64>,
    #[serde(rename = "Tolerance(h)")]
    pub tolerance_h: f64,
    #[serde(rename = "EH_machine(s)")]
    pub eh_machine_s: Option<f64>,
    #[serde(rename = "EH_labor(s)")]
    pub eh_labor_s: Option<f64>,

    #[serde(rename = "TrackOutDate")]
    pub track_out_date: Option<NaiveDate>,
    #[serde(rename = "ProductionGap", default)]
    pub production_gap: bool,
    #[serde(rename = "PT(d)")]
    pub pt_days: Option<f64>,
    #[serde(rename = "ST(d)")]
    pub st_days: Option<f64>,
    #[serde(rename = "CompletionStatus", default)]
    pub completion_status: CompletionStatus,
}

impl BatchOperationRecord {
    /// Builds a typed record with an identity and defaults for everything else.
    pub fn new(batch_number: &str, operation: &str) -> Self {
        BatchOperationRecord {
            batch_number: batch_number.trim().to_string(),
            operation: normalize(Some(operation)),
            track_in_time: None,
            track_out_time: None,
            enter_step_time: None,
            previous_batch_end_time: None,
            checkin_sfc: None,
            due_time: None,
            track_out_quantity: 0.0,
            scrap_quantity: 0.0,
            step_in_quantity: None,
            oee: DEFAULT_OEE,
            setup: None,
            setup_time_h: None,
            tolerance_h: DEFAULT_TOLERANCE_H,
            eh_machine_s: None,
            eh_labor_s: None,
            track_out_date: None,
            production_gap: false,
            pt_days: None,
            st_days: None,
            completion_status: CompletionStatus::Unknown,
        }
    }

    /// Converts an extract row, applying defaults and operation normalization.
    ///
    /// Returns the record and the number of non-empty timestamp cells that
    /// could not be parsed (they become null).
    pub fn from_raw(raw: RawRecord) -> (Self, usize) {
        let mut bad_cells = 0;
        let mut ts = |cell: Option<String>| -> Option<NaiveDateTime> {
            let cell = cell?;
            let parsed = parse_timestamp(&cell);
            if parsed.is_none() && !cell.trim().is_empty() {
                bad_cells += 1;
            }
            parsed
        };

        let track_in_time = ts(raw.track_in_time);
        let track_out_time = ts(raw.track_out_time);
        let enter_step_time = ts(raw.enter_step_time);
        let previous_batch_end_time = ts(raw.previous_batch_end_time);
        let checkin_sfc = ts(raw.checkin_sfc);
        let due_time = ts(raw.due_time);

        let oee = match raw.oee {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => DEFAULT_OEE,
        };
        let tolerance_h = match raw.tolerance_h {
            Some(v) if v.is_finite() => v,
            _ => DEFAULT_TOLERANCE_H,
        };

        let record = BatchOperationRecord {
            batch_number: raw.batch_number.unwrap_or_default().trim().to_string(),
            operation: normalize(raw.operation.as_deref()),
            track_in_time,
            track_out_time,
            enter_step_time,
            previous_batch_end_time,
            checkin_sfc,
            due_time,
            track_out_quantity: non_negative(raw.track_out_quantity),
            scrap_quantity: non_negative(raw.scrap_quantity),
            step_in_quantity: raw.step_in_quantity,
            oee,
            setup: raw
                .setup
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            setup_time_h: raw.setup_time_h.map(|h| non_negative(Some(h))),
            tolerance_h,
            eh_machine_s: raw.eh_machine_s,
            eh_labor_s: raw.eh_labor_s,
            track_out_date: track_out_time.map(|t| t.date()),
            production_gap: false,
            pt_days: None,
            st_days: None,
            completion_status: CompletionStatus::Unknown,
        };

        (record, bad_cells)
    }

    pub fn key(&self) -> MergeKey {
        (self.batch_number.clone(), self.operation.clone())
    }

    pub fn is_setup(&self) -> bool {
        self.setup.as_deref() == Some("Yes")
    }

    /// Value of the configured fallback start column.
    pub fn start_field(&self, field: StartField) -> Option<NaiveDateTime> {
        match field {
            StartField::TrackIn => self.track_in_time,
            StartField::CheckinSfc => self.checkin_sfc,
        }
    }
}

/// Quantities and durations: missing, non-finite or negative cells become 0.
fn non_negative(v: Option<f64>) -> f64 {
    v.filter(|v| v.is_finite()).map_or(0.0, |v| v.max(0.0))
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

/// Parses a timezone-naive timestamp as exported by either source system.
///
/// Bare dates are read as midnight. Returns `None` for empty or unknown input.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell = Option::<String>::deserialize(deserializer)?;
    Ok(cell.and_then(|s| s.trim().parse::<f64>().ok()))
}

/// Serde adapter writing `Option<NaiveDateTime>` as `YYYY-MM-DD HH:MM:SS`,
/// with null as an empty cell.
pub mod naive_ts {
    use super::*;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let cell = Option::<String>::deserialize(deserializer)?;
        Ok(cell.as_deref().and_then(parse_timestamp))
    }
}
