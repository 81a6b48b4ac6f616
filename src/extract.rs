//! Reading source extracts and the merged running dataset.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{EtlError, Result};
use crate::output::{atomic_write, csv_bytes};
use crate::record::{BatchOperationRecord, RawRecord};

/// Columns of a published row, in file order.
pub const DATASET_COLUMNS: &[&str] = &[
    "BatchNumber",
    "Operation",
    "TrackInTime",
    "TrackOutTime",
    "EnterStepTime",
    "PreviousBatchEndTime",
    "Checkin_SFC",
    "DueTime",
    "TrackOutQuantity",
    "ScrapQuantity",
    "StepInQuantity",
    "OEE",
    "Setup",
    "Setup Time (h)",
    "Tolerance(h)",
    "EH_machine(s)",
    "EH_labor(s)",
    "TrackOutDate",
    "ProductionGap",
    "PT(d)",
    "ST(d)",
    "CompletionStatus",
];

/// Result of reading one extract.
#[derive(Debug, Default)]
pub struct Extract {
    pub records: Vec<BatchOperationRecord>,
    /// Non-empty timestamp cells that could not be parsed and were nulled.
    pub unparseable_timestamps: usize,
    /// Rows dropped for having no batch number.
    pub rows_without_batch: usize,
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| EtlError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a CSV extract into typed records.
pub fn read_extract(path: &Path) -> Result<Extract> {
    if !path.exists() {
        return Err(EtlError::MissingExtract {
            path: path.to_path_buf(),
        });
    }
    let extract = read_extract_from(open(path)?)?;

    info!(
        path = %path.display(),
        rows = extract.records.len(),
        unparseable_timestamps = extract.unparseable_timestamps,
        rows_without_batch = extract.rows_without_batch,
        "Extract loaded"
    );
    Ok(extract)
}

/// Reads extract rows from any CSV source with a header line.
pub fn read_extract_from<R: Read>(reader: R) -> Result<Extract> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut extract = Extract::default();

    for result in rdr.deserialize() {
        let raw: RawRecord = result?;
        let (record, bad_cells) = BatchOperationRecord::from_raw(raw);
        extract.unparseable_timestamps += bad_cells;

        if record.batch_number.is_empty() {
            extract.rows_without_batch += 1;
            continue;
        }
        extract.records.push(record);
    }

    if extract.rows_without_batch > 0 {
        warn!(
            rows = extract.rows_without_batch,
            "Dropped extract rows without a batch number"
        );
    }
    Ok(extract)
}

/// Reads the previously published dataset; absent means empty.
pub fn read_dataset(path: &Path) -> Result<Option<Vec<BatchOperationRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = csv::Reader::from_reader(open(path)?);
    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<BatchOperationRecord>, _>>()?;
    Ok(Some(rows))
}

/// Atomically replaces the published dataset.
pub fn write_dataset(path: &Path, records: &[BatchOperationRecord]) -> Result<()> {
    atomic_write(path, &csv_bytes(records, DATASET_COLUMNS)?)
}
