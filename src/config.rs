//! Run configuration for one source system.
//!
//! Stored as a JSON document on disk:
//! ```json
//! {
//!   "system": "mes",
//!   "source": { "mes_path": "extracts/mes.csv" },
//!   "output": { "base_dir": "publish", "scheme": "layered", "gzip": false },
//!   "incremental": { "state_file": "publish/etl_mes_state.json" },
//!   "logging": { "level": "info", "file": "logs/etl_mes.log" }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::record::{SourceSystem, StartField};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub mes_path: Option<PathBuf>,
    pub sfc_latest_file: Option<PathBuf>,
}

/// Which partition layouts a run publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionScheme {
    #[default]
    Flat,
    Layered,
    Both,
}

impl PartitionScheme {
    pub fn flat(&self) -> bool {
        matches!(self, PartitionScheme::Flat | PartitionScheme::Both)
    }

    pub fn layered(&self) -> bool {
        matches!(self, PartitionScheme::Layered | PartitionScheme::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub base_dir: PathBuf,
    #[serde(default)]
    pub scheme: PartitionScheme,
    /// Gzip-compress bucket files.
    #[serde(default)]
    pub gzip: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncrementalConfig {
    pub state_file: Option<PathBuf>,
}

/// Consumed by the binary's logging setup only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeBasisConfig {
    pub fallback_start_field: Option<StartField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub system: SourceSystem,
    #[serde(default)]
    pub source: SourceConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub incremental: IncrementalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub time_basis: TimeBasisConfig,
}

impl EtlConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: EtlConfig = serde_json::from_str(&content).map_err(|e| {
            EtlError::config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal config for `system` publishing under `base_dir`.
    pub fn new(system: SourceSystem, base_dir: impl Into<PathBuf>) -> Self {
        EtlConfig {
            system,
            source: SourceConfig::default(),
            output: OutputConfig {
                base_dir: base_dir.into(),
                scheme: PartitionScheme::default(),
                gzip: false,
            },
            incremental: IncrementalConfig::default(),
            logging: LoggingConfig::default(),
            time_basis: TimeBasisConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.base_dir.as_os_str().is_empty() {
            return Err(EtlError::config("output.base_dir is empty"));
        }
        self.extract_path()?;

        if let Some(state_file) = &self.incremental.state_file {
            let expected = self.system.state_file_name();
            let actual = state_file.file_name().and_then(|n| n.to_str());
            if actual != Some(expected.as_str()) {
                return Err(EtlError::config(format!(
                    "incremental.state_file must be named {expected}, got {}",
                    state_file.display()
                )));
            }
        }
        Ok(())
    }

    /// Extract location of the configured source system.
    pub fn extract_path(&self) -> Result<&Path> {
        let (key, path) = match self.system {
            SourceSystem::Mes => ("source.mes_path", &self.source.mes_path),
            SourceSystem::Sfc => ("source.sfc_latest_file", &self.source.sfc_latest_file),
        };
        match path {
            Some(p) if !p.as_os_str().is_empty() => Ok(p.as_path()),
            _ => Err(EtlError::config(format!("{key} is not configured"))),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.incremental
            .state_file
            .clone()
            .unwrap_or_else(|| self.output.base_dir.join(self.system.state_file_name()))
    }

    pub fn fallback_start_field(&self) -> StartField {
        self.time_basis
            .fallback_start_field
            .unwrap_or_else(|| self.system.default_start_field())
    }

    /// Merged running dataset for this source.
    pub fn dataset_path(&self) -> PathBuf {
        self.output
            .base_dir
            .join(format!("{}_batch_report_latest.csv", self.system.label()))
    }

    pub fn flat_partition_dir(&self) -> PathBuf {
        self.output.base_dir.join("partitions")
    }

    /// Per-system root of the hot/warm/cold tiers, e.g.
    /// `layered_partitions/MES`.
    pub fn layered_partition_dir(&self) -> PathBuf {
        self.output
            .base_dir
            .join("layered_partitions")
            .join(self.system.label())
    }
}
