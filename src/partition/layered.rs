//! Hot / warm / cold partitions bucketed by recency.
//!
//! Tier boundaries are relative to the run date, so a bucket near a
//! boundary moves tiers from one run to the next. The previous tier's file
//! is pruned once the new manifest is in place.
//!
//! Tier file names do not carry the source system, so each system gets its
//! own layered root (see [`crate::config::EtlConfig::layered_partition_dir`]).

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::info;

use crate::error::Result;
use crate::output::write_json;
use crate::partition::UNDATED;
use crate::partition::types::{DateRange, Layer, LayeredManifest, LayeredPartition, Layers, Tier};
use crate::partition::writer::PartitionWriter;
use crate::record::BatchOperationRecord;

pub const MANIFEST_FILE: &str = "layered_metadata.json";

const HOT_DAYS: i64 = 7;
const WARM_DAYS: i64 = 30;

/// Tier of a track-out date as seen on `today`. Undated rows are cold.
pub fn tier_for(date: Option<NaiveDate>, today: NaiveDate) -> Tier {
    let Some(date) = date else {
        return Tier::Cold;
    };
    if date >= today - Duration::days(HOT_DAYS) {
        Tier::Hot
    } else if date >= today - Duration::days(WARM_DAYS) {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

/// Bucket key within a tier: `YYYYMMDD` (hot), `YYYY_Www` by ISO week (warm)
/// or `YYYYMM` (cold).
pub fn bucket_key(tier: Tier, date: Option<NaiveDate>) -> String {
    let Some(date) = date else {
        return UNDATED.to_string();
    };
    match tier {
        Tier::Hot => date.format("%Y%m%d").to_string(),
        Tier::Warm => {
            let week = date.iso_week();
            format!("{}_W{:02}", week.year(), week.week())
        }
        Tier::Cold => date.format("%Y%m").to_string(),
    }
}

fn entry(tier: Tier, key: &str, file: String, rows: usize, size_mb: f64) -> LayeredPartition {
    let label = Some(key.to_string());
    let (date, week, month) = match tier {
        Tier::Hot => (label, None, None),
        Tier::Warm => (None, label, None),
        Tier::Cold => (None, None, label),
    };
    LayeredPartition {
        file,
        rows,
        layer: tier,
        date,
        week,
        month,
        size_mb,
    }
}

/// Writes all tiers of `dataset` as of `today`, replaces the manifest, then
/// prunes buckets that moved or vanished.
pub fn write_layered_partitions(
    writer: &mut PartitionWriter,
    dataset: &[BatchOperationRecord],
    today: NaiveDate,
) -> Result<LayeredManifest> {
    let mut buckets: BTreeMap<(Tier, String), Vec<&BatchOperationRecord>> = BTreeMap::new();
    for record in dataset {
        let tier = tier_for(record.track_out_date, today);
        let key = bucket_key(tier, record.track_out_date);
        buckets.entry((tier, key)).or_default().push(record);
    }

    let mut layers = Layers {
        hot: Layer::empty(Tier::Hot),
        warm: Layer::empty(Tier::Warm),
        cold: Layer::empty(Tier::Cold),
    };

    for ((tier, key), rows) in &buckets {
        let name = tier.as_str();
        let written = writer.write_bucket(Some(name), &format!("{name}_{key}"), rows)?;

        let layer = layers.get_mut(*tier);
        layer.total_rows += written.rows;
        layer.partitions.insert(
            key.clone(),
            entry(*tier, key, written.file, written.rows, written.size_mb),
        );
    }

    let manifest = LayeredManifest {
        created_at: Local::now().naive_local(),
        total_rows: dataset.len(),
        date_range: DateRange::of(dataset.iter().filter_map(|r| r.track_out_date)),
        layers,
    };
    write_json(&writer.root().join(MANIFEST_FILE), &manifest)?;

    for tier in Tier::ALL {
        let name = tier.as_str();
        writer.prune(Some(name), &format!("{name}_"))?;
        let layer = manifest.layers.get(tier);
        info!(
            layer = name,
            partitions = layer.partitions.len(),
            rows = layer.total_rows,
            "Layer complete"
        );
    }

    Ok(manifest)
}
