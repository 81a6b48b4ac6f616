//! One bucket file per `TrackOutDate`.

use std::collections::BTreeMap;

use chrono::Local;
use tracing::info;

use crate::error::Result;
use crate::output::write_json;
use crate::partition::UNDATED;
use crate::partition::types::{DateRange, FlatManifest, FlatPartition};
use crate::partition::writer::PartitionWriter;
use crate::record::BatchOperationRecord;

const MANIFEST_SUFFIX: &str = "partition_metadata.json";

/// Manifest name for one system's buckets, e.g. `MES_partition_metadata.json`.
///
/// Several systems publish into the same partition directory, so the
/// manifest carries the same prefix as the bucket files.
pub fn manifest_file(file_prefix: &str) -> String {
    format!("{file_prefix}_{MANIFEST_SUFFIX}")
}

/// Bucket key of a row: `YYYYMMDD`, or `undated` without a track-out.
pub fn bucket_key(record: &BatchOperationRecord) -> String {
    match record.track_out_date {
        Some(date) => date.format("%Y%m%d").to_string(),
        None => UNDATED.to_string(),
    }
}

/// Writes every date bucket of `dataset`, replaces the manifest, then prunes
/// buckets the new manifest no longer lists.
///
/// Pruning comes last so a failed manifest write leaves the previous
/// manifest pointing at files that still exist.
pub fn write_flat_partitions(
    writer: &mut PartitionWriter,
    file_prefix: &str,
    dataset: &[BatchOperationRecord],
) -> Result<FlatManifest> {
    let mut buckets: BTreeMap<String, Vec<&BatchOperationRecord>> = BTreeMap::new();
    for record in dataset {
        buckets.entry(bucket_key(record)).or_default().push(record);
    }

    let stem_prefix = format!("{file_prefix}_data_");
    let mut partitions = BTreeMap::new();
    for (key, rows) in &buckets {
        let written = writer.write_bucket(None, &format!("{stem_prefix}{key}"), rows)?;
        info!(bucket = %key, rows = written.rows, "Created partition");
        partitions.insert(
            key.clone(),
            FlatPartition {
                file: format!("partitions/{}", written.file),
                date: key.clone(),
                rows: written.rows,
                size_mb: written.size_mb,
            },
        );
    }

    let manifest = FlatManifest {
        created_at: Local::now().naive_local(),
        total_rows: dataset.len(),
        total_partitions: partitions.len(),
        date_range: DateRange::of(dataset.iter().filter_map(|r| r.track_out_date)),
        partitions,
    };
    write_json(&writer.root().join(manifest_file(file_prefix)), &manifest)?;
    writer.prune(None, &stem_prefix)?;

    info!(
        partitions = manifest.total_partitions,
        rows = manifest.total_rows,
        "Flat partitions complete"
    );
    Ok(manifest)
}
