use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::extract::DATASET_COLUMNS;
use crate::output::{atomic_write, csv_bytes, gzip_bytes};
use crate::record::BatchOperationRecord;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A bucket file as it landed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBucket {
    /// Path relative to the partition root, with `/` separators.
    pub file: String,
    pub rows: usize,
    pub size_mb: f64,
}

/// Writes bucket files under one partition root.
///
/// Each bucket fully replaces any previous file at its path.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    root: PathBuf,
    gzip: bool,
    written: HashSet<PathBuf>,
}

impl PartitionWriter {
    pub fn new(root: impl Into<PathBuf>, gzip: bool) -> Self {
        PartitionWriter {
            root: root.into(),
            gzip,
            written: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &'static str {
        if self.gzip { "csv.gz" } else { "csv" }
    }

    /// Writes `rows` to `{subdir}/{stem}.{ext}` under the root.
    pub fn write_bucket(
        &mut self,
        subdir: Option<&str>,
        stem: &str,
        rows: &[&BatchOperationRecord],
    ) -> Result<WrittenBucket> {
        let file_name = format!("{stem}.{}", self.extension());
        let file = match subdir {
            Some(dir) => format!("{dir}/{file_name}"),
            None => file_name,
        };
        let path = self.root.join(&file);

        let mut bytes = csv_bytes(rows, DATASET_COLUMNS)?;
        if self.gzip {
            bytes = gzip_bytes(&bytes, &path)?;
        }
        atomic_write(&path, &bytes)?;
        self.written.insert(path);

        debug!(file = %file, rows = rows.len(), "Bucket written");
        Ok(WrittenBucket {
            file,
            rows: rows.len(),
            size_mb: bytes.len() as f64 / BYTES_PER_MB,
        })
    }

    /// Deletes bucket files in `subdir` starting with `prefix` that this
    /// writer did not produce, i.e. buckets a previous run published that
    /// the current data no longer has. Returns how many were removed.
    pub fn prune(&self, subdir: Option<&str>, prefix: &str) -> Result<usize> {
        let dir = match subdir {
            Some(d) => self.root.join(d),
            None => self.root.clone(),
        };
        if !dir.exists() {
            return Ok(0);
        }

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| EtlError::Io { path, source }
        };

        let mut removed = 0;
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            let is_bucket = name.starts_with(prefix)
                && (name.ends_with(".csv") || name.ends_with(".csv.gz"));
            if !is_bucket || self.written.contains(&path) || !path.is_file() {
                continue;
            }

            fs::remove_file(&path).map_err(io_err(&path))?;
            removed += 1;
            info!(path = %path.display(), "Removed stale bucket");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bucket_paths() {
        let dir = tempfile::tempdir().unwrap();
        let record = BatchOperationRecord::new("B001", "清洗");

        let mut writer = PartitionWriter::new(dir.path(), false);
        let bucket = writer
            .write_bucket(Some("hot"), "hot_20250110", &[&record])
            .unwrap();

        assert_eq!(bucket.file, "hot/hot_20250110.csv");
        assert_eq!(bucket.rows, 1);
        assert!(bucket.size_mb > 0.0);
        assert!(dir.path().join("hot/hot_20250110.csv").is_file());

        let mut gz = PartitionWriter::new(dir.path(), true);
        let bucket = gz.write_bucket(None, "MES_data_20250110", &[&record]).unwrap();
        assert_eq!(bucket.file, "MES_data_20250110.csv.gz");
    }

    #[test]
    fn test_rewrite_replaces_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let a = BatchOperationRecord::new("B001", "清洗");
        let b = BatchOperationRecord::new("B002", "清洗");

        PartitionWriter::new(dir.path(), false)
            .write_bucket(None, "MES_data_20250110", &[&a, &b])
            .unwrap();
        PartitionWriter::new(dir.path(), false)
            .write_bucket(None, "MES_data_20250110", &[&a])
            .unwrap();

        let text = fs::read_to_string(dir.path().join("MES_data_20250110.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_prune_removes_only_stale_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let record = BatchOperationRecord::new("B001", "清洗");
        fs::write(dir.path().join("MES_data_20240101.csv"), "old").unwrap();
        fs::write(dir.path().join("partition_metadata.json"), "{}").unwrap();
        fs::write(dir.path().join("SFC_data_20240101.csv"), "other system").unwrap();

        let mut writer = PartitionWriter::new(dir.path(), false);
        writer
            .write_bucket(None, "MES_data_20250110", &[&record])
            .unwrap();
        let removed = writer.prune(None, "MES_data_").unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.path().join("MES_data_20240101.csv").exists());
        assert!(dir.path().join("MES_data_20250110.csv").exists());
        assert!(dir.path().join("partition_metadata.json").exists());
        assert!(dir.path().join("SFC_data_20240101.csv").exists());
    }
}
