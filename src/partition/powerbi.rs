//! Power Query (M) templates placed next to the manifests.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::output::atomic_write;
use crate::partition::{flat, layered};

const FLAT_QUERY_SUFFIX: &str = "PowerBI_Incremental_Query.m";
const FLAT_README_SUFFIX: &str = "PowerBI_README.md";
pub const LAYERED_QUERY_FILE: &str = "PowerBI_Layered_Query.m";

/// Flat query name for one system, e.g. `MES_PowerBI_Incremental_Query.m`.
pub fn flat_query_file(file_prefix: &str) -> String {
    format!("{file_prefix}_{FLAT_QUERY_SUFFIX}")
}

pub fn flat_readme_file(file_prefix: &str) -> String {
    format!("{file_prefix}_{FLAT_README_SUFFIX}")
}

const FLAT_TEMPLATE: &str = r#"let
    DataRoot = "{data_root}",
    Manifest = Json.Document(File.Contents(DataRoot & "/{manifest}")),
    Partitions = Record.FieldValues(Manifest[partitions]),

    DaysBack = 30,
    Dated = List.Select(Partitions, each _[date] <> "undated"),
    Recent = List.Select(
        Dated,
        each Date.From(DateTime.LocalNow())
            - #date(
                Number.From(Text.Start(_[date], 4)),
                Number.From(Text.Middle(_[date], 4, 2)),
                Number.From(Text.End(_[date], 2)))
            <= #duration(DaysBack, 0, 0, 0)
    ),

    LoadBucket = (file as text) =>
        Table.PromoteHeaders(
            Csv.Document({contents}, [Delimiter = ",", Encoding = 65001, QuoteStyle = QuoteStyle.Csv]),
            [PromoteAllScalars = true]
        ),
    Source = Table.Combine(List.Transform(Recent, each LoadBucket(_[file]))),
    Typed = Table.TransformColumnTypes(Source, {{"TrackOutDate", type date}})
in
    Typed
"#;

const LAYERED_TEMPLATE: &str = r#"let
    DataRoot = "{data_root}",
    Manifest = Json.Document(File.Contents(DataRoot & "/{manifest}")),

    // hot, warm or cold
    Layer = "hot",
    Partitions = Record.FieldValues(Record.Field(Manifest[layers], Layer)[partitions]),

    LoadBucket = (file as text) =>
        Table.PromoteHeaders(
            Csv.Document({contents}, [Delimiter = ",", Encoding = 65001, QuoteStyle = QuoteStyle.Csv]),
            [PromoteAllScalars = true]
        ),
    Source = Table.Combine(List.Transform(Partitions, each LoadBucket(_[file]))),
    Typed = Table.TransformColumnTypes(Source, {{"TrackOutDate", type date}})
in
    Typed
"#;

const FLAT_README: &str = r#"# {prefix} partitions in Power BI

## Loading

Replace the data source with the query in `{query}`. It reads
`{manifest}`, keeps the buckets of the last 30 days and combines them.
Change `DaysBack` for a longer window. The `undated` bucket holds rows
without a track-out time and is never loaded by the query.

## Refresh

- Schedule a daily refresh; only the last 7 to 30 days change between runs.
- Load older history on demand instead of on every refresh.
- Bucket files are replaced whole, so a refresh never sees a partial file.
"#;

fn contents_expr(gzip: bool) -> &'static str {
    if gzip {
        r#"Binary.Decompress(File.Contents(DataRoot & "/" & file), Compression.GZip)"#
    } else {
        r#"File.Contents(DataRoot & "/" & file)"#
    }
}

/// Power Query wants forward slashes even on Windows.
fn m_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn render(template: &str, data_root: &Path, manifest: &str, gzip: bool) -> String {
    template
        .replace("{data_root}", &m_path(data_root))
        .replace("{manifest}", manifest)
        .replace("{contents}", contents_expr(gzip))
}

/// Writes the flat query and its usage note into `partition_dir`. Manifest
/// file paths are relative to `data_root`, the partition directory's parent.
pub fn write_flat_query(
    partition_dir: &Path,
    data_root: &Path,
    file_prefix: &str,
    gzip: bool,
) -> Result<PathBuf> {
    let manifest = format!("partitions/{}", flat::manifest_file(file_prefix));
    let query = flat_query_file(file_prefix);

    let path = partition_dir.join(&query);
    atomic_write(&path, render(FLAT_TEMPLATE, data_root, &manifest, gzip).as_bytes())?;

    let readme = FLAT_README
        .replace("{prefix}", file_prefix)
        .replace("{query}", &query)
        .replace("{manifest}", &manifest);
    atomic_write(&partition_dir.join(flat_readme_file(file_prefix)), readme.as_bytes())?;

    Ok(path)
}

/// Writes the layered query into the layered partition root.
pub fn write_layered_query(root: &Path, gzip: bool) -> Result<PathBuf> {
    let path = root.join(LAYERED_QUERY_FILE);
    let body = render(LAYERED_TEMPLATE, root, layered::MANIFEST_FILE, gzip);
    atomic_write(&path, body.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_flat_query_points_at_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = dir.path().join("partitions");

        let path = write_flat_query(&partitions, dir.path(), "MES", false).unwrap();
        assert_eq!(path, partitions.join("MES_PowerBI_Incremental_Query.m"));
        let body = fs::read_to_string(path).unwrap();

        assert!(body.contains("partitions/MES_partition_metadata.json"));
        assert!(body.contains(&m_path(dir.path())));
        assert!(body.contains("Csv.Document(File.Contents("));
        assert!(!body.contains("{data_root}"));
        assert!(!body.contains("{contents}"));
    }

    #[test]
    fn test_flat_readme_names_query_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = dir.path().join("partitions");

        write_flat_query(&partitions, dir.path(), "SFC", false).unwrap();
        let readme = fs::read_to_string(partitions.join("SFC_PowerBI_README.md")).unwrap();

        assert!(readme.starts_with("# SFC partitions in Power BI"));
        assert!(readme.contains("`SFC_PowerBI_Incremental_Query.m`"));
        assert!(readme.contains("`partitions/SFC_partition_metadata.json`"));
    }

    #[test]
    fn test_layered_query_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_layered_query(dir.path(), true).unwrap();
        let body = fs::read_to_string(path).unwrap();

        assert!(body.contains("layered_metadata.json"));
        assert!(body.contains("Compression.GZip"));
    }

    #[test]
    fn test_windows_paths_use_forward_slashes() {
        assert_eq!(m_path(Path::new(r"D:\publish\partitions")), "D:/publish/partitions");
    }
}
