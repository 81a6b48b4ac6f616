//! Persistence helpers for published files.
//!
//! Every file is written to a temporary sibling first and renamed over the
//! destination, so readers see either the previous file or the new one and
//! never a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::debug;

use crate::error::{EtlError, Result};

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Replaces `path` with `bytes` via write-to-temp then rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source| EtlError::PartitionWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = temp_path(path);
    let written = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "File replaced");
    Ok(())
}

/// Serializes rows as CSV with a header line.
///
/// An empty slice still produces the header so the file stays loadable.
pub fn csv_bytes<T: Serialize>(rows: &[T], headers: &[&str]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(!rows.is_empty())
        .from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(headers)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::Csv(e.into_error().into()))
}

/// Gzip-compresses the contents destined for `path`.
pub fn gzip_bytes(bytes: &[u8], path: &Path) -> Result<Vec<u8>> {
    gzip_into(bytes, Vec::new(), path)
}

fn gzip_into<W: Write>(bytes: &[u8], sink: W, path: &Path) -> Result<W> {
    let mut encoder = GzEncoder::new(sink, Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|source| EtlError::PartitionWrite {
            path: path.to_path_buf(),
            source,
        })
}

/// Atomically writes `value` as pretty-printed JSON.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &body)
}
