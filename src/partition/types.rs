//! Manifest types describing published partitions.
//!
//! Manifests are what a BI query layer reads to pick buckets by recency, so
//! the file references and row counts in them must match the files exactly.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Earliest and latest `TrackOutDate` in a published dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn of(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        dates.into_iter().fold(DateRange::default(), |range, d| DateRange {
            start: Some(range.start.map_or(d, |s| s.min(d))),
            end: Some(range.end.map_or(d, |e| e.max(d))),
        })
    }
}

/// One bucket of the flat, one-file-per-day layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatPartition {
    /// Path relative to the partition directory.
    pub file: String,
    /// `YYYYMMDD`, or `undated` for rows without a track-out.
    pub date: String,
    pub rows: usize,
    pub size_mb: f64,
}

/// `partitions/{SYSTEM}_partition_metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatManifest {
    pub created_at: NaiveDateTime,
    pub total_rows: usize,
    pub total_partitions: usize,
    pub date_range: DateRange,
    pub partitions: BTreeMap<String, FlatPartition>,
}

/// Recency tier of a layered bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tier::Hot => "Last 7 days, bucketed by day for fast daily refresh",
            Tier::Warm => "Days 8-30, bucketed by ISO week for weekly analysis",
            Tier::Cold => "Older history, bucketed by month for monthly and trend analysis",
        }
    }

    pub fn refresh_frequency(&self) -> &'static str {
        match self {
            Tier::Hot => "daily",
            Tier::Warm => "weekly",
            Tier::Cold => "monthly",
        }
    }
}

/// One bucket of the layered layout. Exactly one of `date`, `week` and
/// `month` is set, matching the tier's bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredPartition {
    pub file: String,
    pub rows: usize,
    pub layer: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub description: String,
    pub refresh_frequency: String,
    pub total_rows: usize,
    pub partitions: BTreeMap<String, LayeredPartition>,
}

impl Layer {
    pub fn empty(tier: Tier) -> Self {
        Layer {
            description: tier.description().to_string(),
            refresh_frequency: tier.refresh_frequency().to_string(),
            total_rows: 0,
            partitions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layers {
    pub hot: Layer,
    pub warm: Layer,
    pub cold: Layer,
}

impl Layers {
    pub fn get(&self, tier: Tier) -> &Layer {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut Layer {
        match tier {
            Tier::Hot => &mut self.hot,
            Tier::Warm => &mut self.warm,
            Tier::Cold => &mut self.cold,
        }
    }
}

/// `layered_partitions/{SYSTEM}/layered_metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredManifest {
    pub created_at: NaiveDateTime,
    pub total_rows: usize,
    pub date_range: DateRange,
    pub layers: Layers,
}

impl LayeredManifest {
    pub fn partition_count(&self) -> usize {
        Tier::ALL
            .iter()
            .map(|t| self.layers.get(*t).partitions.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_of() {
        let range = DateRange::of([d("2025-01-10"), d("2024-12-30"), d("2025-02-01")]);
        assert_eq!(range.start, Some(d("2024-12-30")));
        assert_eq!(range.end, Some(d("2025-02-01")));
        assert_eq!(DateRange::of([]), DateRange::default());
    }

    #[test]
    fn test_layered_partition_omits_unused_labels() {
        let entry = LayeredPartition {
            file: "warm/warm_2025_W02.csv".into(),
            rows: 3,
            layer: Tier::Warm,
            date: None,
            week: Some("2025_W02".into()),
            month: None,
            size_mb: 0.0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["layer"], "warm");
        assert_eq!(json["week"], "2025_W02");
        assert!(json.get("date").is_none());
        assert!(json.get("month").is_none());
    }
}
