//! Error types for ETL runs.
//!
//! Only configuration and I/O problems are errors. Missing inputs and
//! invalid intervals inside a record are recovered locally as null derived
//! fields and show up in [`crate::metrics::enrich::DerivationSummary`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors that abort the run for one source system.
#[derive(Debug, Error)]
pub enum EtlError {
    /// A required option is missing or malformed.
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The configured extract file does not exist.
    #[error("extract file not found: {}", path.display())]
    MissingExtract {
        /// Path taken from configuration.
        path: PathBuf,
    },

    /// A state file exists but cannot be parsed.
    #[error("state file {} is corrupt: {source}", path.display())]
    StateCorruption {
        /// Location of the unreadable state file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// Writing a partition, dataset, manifest or state file failed.
    #[error("failed to write {}: {source}", path.display())]
    PartitionWrite {
        /// Final destination of the file being written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Reading a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A CSV table could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EtlError::Config {
            message: message.into(),
        }
    }
}
