//! Flat-file exports of crawled records: a year-keyed JSON snapshot and CSV.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::library::YearIndex;
use crate::record::{CORE_FIELDS, PublicationRecord};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    Ok(())
}

/// Write `{year: [record, ...]}` as pretty JSON, replacing any existing file.
pub fn write_snapshot(path: &Path, index: &YearIndex) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(index)?;
    std::fs::write(path, json).map_err(io_error(path))?;
    tracing::info!(path = %path.display(), years = index.len(), "snapshot written");
    Ok(())
}

/// Load a snapshot written by [`write_snapshot`].
pub fn read_snapshot(path: &Path) -> Result<YearIndex, ExportError> {
    let content = std::fs::read_to_string(path).map_err(io_error(path))?;
    Ok(serde_json::from_str(&content)?)
}

/// Column names for a CSV of `records`: `entry_type`, `id`, then every field
/// populated in at least one record (core fields first, extras sorted).
pub fn csv_columns(records: &[PublicationRecord]) -> Vec<String> {
    let populated: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields().into_iter().map(|(k, _)| k))
        .collect();

    let mut columns = vec!["entry_type".to_string(), "id".to_string()];
    columns.extend(
        CORE_FIELDS
            .iter()
            .filter(|f| populated.contains(*f))
            .map(|f| f.to_string()),
    );
    columns.extend(
        populated
            .iter()
            .filter(|f| !CORE_FIELDS.contains(*f))
            .map(|f| f.to_string()),
    );
    columns
}

/// Write records as CSV with a header row.
pub fn write_crawled_csv(path: &Path, records: &[PublicationRecord]) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let columns = csv_columns(records);
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;
    for record in records {
        let row: Vec<&str> = columns
            .iter()
            .map(|c| match c.as_str() {
                "entry_type" => record.entry_type.as_str(),
                "id" => record.id.as_str(),
                field => record.get(field).unwrap_or(""),
            })
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush().map_err(io_error(path))?;
    tracing::info!(path = %path.display(), rows = records.len(), "crawled records saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::organize_by_year;

    fn crawled() -> Vec<PublicationRecord> {
        vec![
            PublicationRecord::new("Deep Learning Systems")
                .with_author("Jane Doe")
                .with_year("2020")
                .with_doi("10.1/dls")
                .with_field("volume", "3")
                .with_derived_id(),
            PublicationRecord::new("Undated, with comma")
                .with_field("issn", "1234-5678")
                .with_derived_id(),
        ]
    }

    #[test]
    fn snapshot_round_trip_keyed_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/snapshot.json");
        let index = organize_by_year(crawled());

        write_snapshot(&path, &index).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["2020"].is_array());
        assert_eq!(raw["Unknown"][0]["title"], "Undated, with comma");

        assert_eq!(read_snapshot(&path).unwrap(), index);
    }

    #[test]
    fn columns_are_union_of_populated_fields() {
        let cols = csv_columns(&crawled());
        assert_eq!(
            cols,
            vec!["entry_type", "id", "author", "title", "year", "doi", "issn", "volume"]
        );
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawled.csv");
        write_crawled_csv(&path, &crawled()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(3), Some("title"));
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some("article"));
        assert_eq!(rows[0].get(1), Some("10.1/dls"));
        assert_eq!(rows[1].get(3), Some("Undated, with comma"));
        assert_eq!(rows[1].get(4), Some(""));
    }

    #[test]
    fn empty_record_set_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_crawled_csv(&path, &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "entry_type,id");
    }
}
