use std::fs;
use std::path::{Path, PathBuf};

use batch_time_etl::config::{EtlConfig, PartitionScheme};
use batch_time_etl::error::EtlError;
use batch_time_etl::extract::read_dataset;
use batch_time_etl::incremental::IncrementalState;
use batch_time_etl::partition::types::{FlatManifest, LayeredManifest};
use batch_time_etl::pipeline::run;
use batch_time_etl::record::{BatchOperationRecord, CompletionStatus, SourceSystem};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

const HEADER: &str = "BatchNumber,Operation,TrackInTime,TrackOutTime,EnterStepTime,PreviousBatchEndTime,Checkin_SFC,TrackOutQuantity,ScrapQuantity,OEE,Setup,Setup Time (h),Tolerance(h),EH_machine(s),EH_labor(s)";

const MES_ROWS: &[&str] = &[
    // continuous production: PT 8h, ST 0.2d
    "B001,CZM 数控铣（外协）,2025-01-10 09:00:00,2025-01-10 16:00:00,2025-01-10 07:00:00,2025-01-10 08:00:00,,100,5,0.8,No,,8,120,150",
    // no unit time: PT/ST undefined
    "B002,CZM 清洗,2025-01-11 08:00:00,2025-01-11 16:00:00,,,,10,,,No,,,,",
    // two days for a few minutes of work
    "B003,线切割-慢走丝,,2025-01-03 08:00:00,2025-01-01 07:00:00,2025-01-01 08:00:00,,10,0,0.8,No,,8,60,",
];

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 12).unwrap()
}

fn write_extract(path: &Path, rows: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    fs::write(path, body).unwrap();
}

fn mes_config(dir: &Path, scheme: PartitionScheme) -> EtlConfig {
    let extract = dir.join("extracts/mes.csv");
    write_extract(&extract, MES_ROWS);

    let mut config = EtlConfig::new(SourceSystem::Mes, dir.join("publish"));
    config.source.mes_path = Some(extract);
    config.output.scheme = scheme;
    config
}

fn find<'a>(rows: &'a [BatchOperationRecord], batch: &str) -> &'a BatchOperationRecord {
    rows.iter().find(|r| r.batch_number == batch).unwrap()
}

fn dataset(config: &EtlConfig) -> Vec<BatchOperationRecord> {
    read_dataset(&config.dataset_path()).unwrap().unwrap()
}

/// Every bucket file under `dir`, sorted, with its contents.
fn bucket_files(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "csv") {
                files.push((path.clone(), fs::read(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}

#[test]
fn test_first_run_publishes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = mes_config(dir.path(), PartitionScheme::Both);

    let summary = run(&config, today()).unwrap();
    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_new, 3);
    assert_eq!(summary.rows_merged, 3);
    assert_eq!(summary.flat_partitions, Some(3));
    assert_eq!(summary.layered_partitions, Some(3));
    assert_eq!(summary.derivation.unknown, 1);

    let rows = dataset(&config);
    let b001 = find(&rows, "B001");
    assert_eq!(b001.operation, "数控铣");
    assert_eq!(b001.pt_days, Some(0.33));
    assert_eq!(b001.st_days, Some(0.2));
    assert_eq!(b001.completion_status, CompletionStatus::OnTime);

    let b002 = find(&rows, "B002");
    assert_eq!(b002.pt_days, None);
    assert_eq!(b002.st_days, None);
    assert_eq!(b002.completion_status, CompletionStatus::Unknown);

    let b003 = find(&rows, "B003");
    assert_eq!(b003.operation, "线切割");
    assert_eq!(b003.completion_status, CompletionStatus::Overdue);

    let publish = dir.path().join("publish");
    assert!(publish.join("partitions/MES_data_20250110.csv").is_file());
    assert!(publish.join("partitions/MES_partition_metadata.json").is_file());
    assert!(publish.join("partitions/MES_PowerBI_Incremental_Query.m").is_file());
    assert!(publish.join("layered_partitions/MES/hot/hot_20250111.csv").is_file());
    assert!(publish.join("layered_partitions/MES/warm/warm_2025_W01.csv").is_file());
    assert!(publish.join("layered_partitions/MES/PowerBI_Layered_Query.m").is_file());

    let manifest: LayeredManifest = serde_json::from_str(
        &fs::read_to_string(publish.join("layered_partitions/MES/layered_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.layers.hot.total_rows, 2);
    assert_eq!(manifest.layers.warm.total_rows, 1);
    assert_eq!(manifest.layers.cold.total_rows, 0);

    let state = IncrementalState::load(&config.state_file()).unwrap();
    assert_eq!(state.known_keys.len(), 3);
    assert_eq!(
        state.high_water_mark.map(|t| t.to_string()),
        Some("2025-01-11 16:00:00".to_string())
    );
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = mes_config(dir.path(), PartitionScheme::Both);
    let publish = dir.path().join("publish");

    run(&config, today()).unwrap();
    let state_before = fs::read(config.state_file()).unwrap();
    let dataset_before = fs::read(config.dataset_path()).unwrap();
    let buckets_before = bucket_files(&publish);

    let summary = run(&config, today()).unwrap();
    assert_eq!(summary.rows_new, 0);
    assert_eq!(summary.rows_unchanged, 3);
    assert_eq!(summary.rows_merged, 3);

    assert_eq!(fs::read(config.state_file()).unwrap(), state_before);
    assert_eq!(fs::read(config.dataset_path()).unwrap(), dataset_before);
    assert_eq!(bucket_files(&publish), buckets_before);
}

#[test]
fn test_incremental_update_replaces_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = mes_config(dir.path(), PartitionScheme::Flat);
    run(&config, today()).unwrap();

    write_extract(
        config.source.mes_path.as_ref().unwrap(),
        &[
            // B001 reworked and tracked out again a day later
            "B001,数控铣,2025-01-10 09:00:00,2025-01-11 18:00:00,2025-01-10 07:00:00,2025-01-10 08:00:00,,100,5,0.8,No,,8,120,150",
            "B004,锯_手动,,2025-01-12 10:00:00,2025-01-12 07:00:00,2025-01-12 08:00:00,,20,0,0.8,No,,8,30,",
        ],
    );

    let summary = run(&config, today()).unwrap();
    assert_eq!(summary.rows_read, 2);
    assert_eq!(summary.rows_new, 2);
    assert_eq!(summary.rows_merged, 4);

    let rows = dataset(&config);
    assert_eq!(rows.len(), 4);
    assert_eq!(find(&rows, "B001").pt_days, Some(1.42));
    assert_eq!(find(&rows, "B004").operation, "锯");
    // rows absent from the new extract are kept as published
    assert_eq!(find(&rows, "B003").completion_status, CompletionStatus::Overdue);

    let publish = dir.path().join("publish/partitions");
    assert!(publish.join("MES_data_20250112.csv").is_file());
    // B001 moved to the 11th, leaving the 10th empty
    assert!(!publish.join("MES_data_20250110.csv").exists());
}

#[test]
fn test_corrupt_state_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = mes_config(dir.path(), PartitionScheme::Flat);

    let state_file = config.state_file();
    fs::create_dir_all(state_file.parent().unwrap()).unwrap();
    fs::write(&state_file, "{ not json").unwrap();

    let err = run(&config, today()).unwrap_err();
    assert!(matches!(err, EtlError::StateCorruption { .. }));
    assert!(!config.dataset_path().exists());
    assert_eq!(fs::read_to_string(&state_file).unwrap(), "{ not json");
}

#[test]
fn test_missing_extract() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EtlConfig::new(SourceSystem::Sfc, dir.path().join("publish"));
    config.source.sfc_latest_file = Some(dir.path().join("nowhere.csv"));

    let err = run(&config, today()).unwrap_err();
    assert!(matches!(err, EtlError::MissingExtract { .. }));
}

#[test]
fn test_unconfigured_extract_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::new(SourceSystem::Mes, dir.path().join("publish"));

    let err = run(&config, today()).unwrap_err();
    assert!(matches!(err, EtlError::Config { .. }));
}

#[test]
fn test_sources_share_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mes = mes_config(dir.path(), PartitionScheme::Both);

    let sfc_extract = dir.path().join("extracts/sfc.csv");
    write_extract(
        &sfc_extract,
        // idle overnight: starts from Checkin_SFC, not TrackInTime
        &["B010,数控车,2025-01-11 09:00:00,2025-01-11 16:00:00,2025-01-11 08:00:00,2025-01-10 16:00:00,2025-01-11 10:00:00,100,5,0.8,No,,8,120,"],
    );
    let mut sfc = EtlConfig::new(SourceSystem::Sfc, dir.path().join("publish"));
    sfc.source.sfc_latest_file = Some(sfc_extract);
    sfc.output.scheme = PartitionScheme::Both;

    run(&mes, today()).unwrap();
    let mes_state = fs::read(mes.state_file()).unwrap();
    let publish = dir.path().join("publish");
    let mes_buckets = bucket_files(&publish);

    let summary = run(&sfc, today()).unwrap();
    assert_eq!(summary.derivation.production_gaps, 1);

    assert_ne!(mes.state_file(), sfc.state_file());
    assert_eq!(fs::read(mes.state_file()).unwrap(), mes_state);
    let sfc_state = IncrementalState::load(&sfc.state_file()).unwrap();
    assert_eq!(sfc_state.known_keys.len(), 1);

    let rows = dataset(&sfc);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].production_gap);
    assert_eq!(rows[0].pt_days, Some(0.25));

    // the SFC run leaves every MES file in place, byte for byte
    for (path, bytes) in &mes_buckets {
        assert_eq!(&fs::read(path).unwrap(), bytes, "{}", path.display());
    }
    assert!(publish.join("partitions/SFC_data_20250111.csv").is_file());
    assert!(publish.join("layered_partitions/SFC/hot/hot_20250111.csv").is_file());

    let mes_manifest: LayeredManifest = serde_json::from_str(
        &fs::read_to_string(publish.join("layered_partitions/MES/layered_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(mes_manifest.total_rows, 3);
    let mes_flat: FlatManifest = serde_json::from_str(
        &fs::read_to_string(publish.join("partitions/MES_partition_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(mes_flat.total_rows, 3);
    let sfc_flat: FlatManifest = serde_json::from_str(
        &fs::read_to_string(publish.join("partitions/SFC_partition_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(sfc_flat.total_rows, 1);
}

#[test]
fn test_lost_dataset_is_rebuilt_from_extract() {
    let dir = tempfile::tempdir().unwrap();
    let config = mes_config(dir.path(), PartitionScheme::Flat);
    run(&config, today()).unwrap();

    fs::remove_file(config.dataset_path()).unwrap();
    let summary = run(&config, today()).unwrap();

    assert_eq!(summary.rows_new, 3);
    assert_eq!(dataset(&config).len(), 3);
}

#[test]
fn test_gzip_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = mes_config(dir.path(), PartitionScheme::Flat);
    config.output.gzip = true;

    run(&config, today()).unwrap();

    let publish = dir.path().join("publish/partitions");
    assert!(publish.join("MES_data_20250110.csv.gz").is_file());
    assert!(!publish.join("MES_data_20250110.csv").exists());
}
