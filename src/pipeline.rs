//! One incremental run for one source system.
//!
//! Order matters for crash safety: the dataset and partitions are published
//! before the state file is advanced, so an interrupted run is retried in
//! full on the next invocation instead of losing rows.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EtlConfig;
use crate::error::Result;
use crate::extract::{read_dataset, read_extract, write_dataset};
use crate::incremental::{IncrementalState, filter_new, merge};
use crate::metrics::enrich::{DerivationSummary, Deriver};
use crate::partition::flat::write_flat_partitions;
use crate::partition::layered::write_layered_partitions;
use crate::partition::powerbi::{write_flat_query, write_layered_query};
use crate::partition::writer::PartitionWriter;
use crate::record::SourceSystem;

/// What a run did, for logging and for the caller's exit status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub system: SourceSystem,
    pub rows_read: usize,
    pub rows_new: usize,
    pub rows_unchanged: usize,
    pub rows_merged: usize,
    pub flat_partitions: Option<usize>,
    pub layered_partitions: Option<usize>,
    pub unparseable_timestamps: usize,
    pub derivation: DerivationSummary,
}

/// Runs the full extract → derive → merge → publish cycle for the
/// configured source. `today` anchors the layered tiers.
#[tracing::instrument(skip(config), fields(system = %config.system))]
pub fn run(config: &EtlConfig, today: NaiveDate) -> Result<RunSummary> {
    config.validate()?;
    let extract_path = config.extract_path()?;
    let state_path = config.state_file();
    let dataset_path = config.dataset_path();

    let mut state = IncrementalState::load(&state_path)?;
    let extract = read_extract(extract_path)?;
    let rows_read = extract.records.len();

    let mut records = extract.records;
    let derivation = Deriver::new(config.fallback_start_field()).enrich(&mut records);
    info!(
        records = derivation.records,
        production_gaps = derivation.production_gaps,
        pt_missing_input = derivation.pt_missing_input,
        pt_invalid_interval = derivation.pt_invalid_interval,
        st_missing_input = derivation.st_missing_input,
        unknown = derivation.unknown,
        "Derivation complete"
    );

    let existing = match read_dataset(&dataset_path)? {
        Some(rows) => rows,
        None => {
            if !state.is_empty() {
                warn!(
                    dataset = %dataset_path.display(),
                    "Published dataset is missing, reprocessing every extract row"
                );
                state = IncrementalState::default();
            }
            Vec::new()
        }
    };

    let (new_rows, unchanged) = filter_new(records, &state);
    let rows_new = new_rows.len();
    let rows_unchanged = unchanged.len();
    let merged = merge(existing, new_rows);
    info!(
        new = rows_new,
        unchanged = rows_unchanged,
        merged = merged.len(),
        "Merged into running dataset"
    );

    write_dataset(&dataset_path, &merged)?;

    let gzip = config.output.gzip;
    let base_dir = &config.output.base_dir;

    let mut flat_partitions = None;
    if config.output.scheme.flat() {
        let partition_dir = config.flat_partition_dir();
        let mut writer = PartitionWriter::new(&partition_dir, gzip);
        let manifest = write_flat_partitions(&mut writer, config.system.label(), &merged)?;
        write_flat_query(&partition_dir, base_dir, config.system.label(), gzip)?;
        flat_partitions = Some(manifest.total_partitions);
    }

    let mut layered_partitions = None;
    if config.output.scheme.layered() {
        let root = config.layered_partition_dir();
        let mut writer = PartitionWriter::new(&root, gzip);
        let manifest = write_layered_partitions(&mut writer, &merged, today)?;
        write_layered_query(&root, gzip)?;
        layered_partitions = Some(manifest.partition_count());
    }

    state.advance(&merged).save(&state_path)?;

    let summary = RunSummary {
        system: config.system,
        rows_read,
        rows_new,
        rows_unchanged,
        rows_merged: merged.len(),
        flat_partitions,
        layered_partitions,
        unparseable_timestamps: extract.unparseable_timestamps,
        derivation,
    };
    info!(
        rows_read = summary.rows_read,
        rows_new = summary.rows_new,
        rows_merged = summary.rows_merged,
        flat_partitions = ?summary.flat_partitions,
        layered_partitions = ?summary.layered_partitions,
        "Run complete"
    );
    Ok(summary)
}
