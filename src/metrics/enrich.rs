use serde::Serialize;
use tracing::debug;

use crate::metrics::Unavailable;
use crate::metrics::completion::classify_record;
use crate::metrics::processing::processing_time;
use crate::metrics::standard::standard_time;
use crate::metrics::time_basis::resolve_start;
use crate::record::{BatchOperationRecord, CompletionStatus, StartField};

/// Counts of derivation outcomes for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationSummary {
    pub records: usize,
    pub production_gaps: usize,
    pub pt_missing_input: usize,
    pub pt_invalid_interval: usize,
    pub st_missing_input: usize,
    pub on_time: usize,
    pub overdue: usize,
    pub unknown: usize,
}

impl DerivationSummary {
    fn count_pt(&mut self, pt: &Result<f64, Unavailable>) {
        match pt {
            Err(Unavailable::MissingInput) => self.pt_missing_input += 1,
            Err(Unavailable::InvalidInterval) => self.pt_invalid_interval += 1,
            Ok(_) => {}
        }
    }

    fn count_status(&mut self, status: CompletionStatus) {
        match status {
            CompletionStatus::OnTime => self.on_time += 1,
            CompletionStatus::Overdue => self.overdue += 1,
            CompletionStatus::Unknown => self.unknown += 1,
        }
    }
}

/// Derives PT, ST and completion status, parameterized only by the column
/// that holds the source system's check-in time.
#[derive(Debug, Clone, Copy)]
pub struct Deriver {
    fallback: StartField,
}

impl Deriver {
    pub fn new(fallback: StartField) -> Self {
        Deriver { fallback }
    }

    /// Recomputes every derived field of `record` from its inputs.
    pub fn derive(
        &self,
        record: &mut BatchOperationRecord,
    ) -> (Result<f64, Unavailable>, Result<f64, Unavailable>) {
        let resolved = resolve_start(record, self.fallback);
        let pt = processing_time(record, resolved.start);
        let st = standard_time(record);

        record.production_gap = resolved.production_gap;
        record.track_out_date = record.track_out_time.map(|t| t.date());
        // PT and ST are published as a pair: both known or both null.
        match (&pt, &st) {
            (Ok(pt_days), Ok(st_days)) => {
                record.pt_days = Some(*pt_days);
                record.st_days = Some(*st_days);
            }
            _ => {
                record.pt_days = None;
                record.st_days = None;
            }
        }
        record.completion_status = classify_record(record);

        (pt, st)
    }

    /// Derives every record in place and tallies the outcomes.
    pub fn enrich(&self, records: &mut [BatchOperationRecord]) -> DerivationSummary {
        let mut summary = DerivationSummary::default();

        for record in records.iter_mut() {
            let (pt, st) = self.derive(record);

            summary.records += 1;
            if record.production_gap {
                summary.production_gaps += 1;
            }
            summary.count_pt(&pt);
            if st.is_err() {
                summary.st_missing_input += 1;
            }
            summary.count_status(record.completion_status);

            if let Err(reason) = pt {
                debug!(
                    batch = %record.batch_number,
                    operation = %record.operation,
                    ?reason,
                    "PT undefined"
                );
            }
        }

        summary
    }
}
