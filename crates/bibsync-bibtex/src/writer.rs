//! BibTeX output for [`PublicationRecord`]s.

use std::fmt::Write as _;
use std::path::Path;

use bibsync_core::PublicationRecord;

use crate::BibError;

/// Entry types whose container is written as `booktitle` instead of `journal`.
const BOOKTITLE_TYPES: [&str; 4] = ["inproceedings", "incollection", "proceedings", "conference"];

fn record_label(record: &PublicationRecord) -> String {
    if !record.title.trim().is_empty() {
        record.title.clone()
    } else if !record.id.trim().is_empty() {
        record.id.clone()
    } else {
        "<untitled>".to_string()
    }
}

/// "Given Family, Given Family" as a BibTeX `and`-separated name list.
fn bibtex_name_list(authors: &str) -> String {
    authors
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Format one record as a BibTeX entry.
///
/// Empty fields are dropped. Fails if `entry_type` or `id` is empty.
pub fn format_record(record: &PublicationRecord) -> Result<String, BibError> {
    let entry_type = record.entry_type.trim().to_lowercase();
    if entry_type.is_empty() {
        return Err(BibError::MissingField {
            field: "entry_type",
            record: record_label(record),
        });
    }
    let id = record.id.trim();
    if id.is_empty() {
        return Err(BibError::MissingField {
            field: "id",
            record: record_label(record),
        });
    }

    let container_field = if BOOKTITLE_TYPES.contains(&entry_type.as_str()) {
        "booktitle"
    } else {
        "journal"
    };

    let mut out = format!("@{entry_type}{{{id},\n");
    for (name, value) in record.fields() {
        let (name, value) = match name {
            "container-title" => (container_field, value.trim().to_string()),
            "author" => (name, bibtex_name_list(value)),
            _ => (name, value.trim().to_string()),
        };
        let _ = writeln!(out, "    {name} = {{{value}}},");
    }
    out.push_str("}\n");
    Ok(out)
}

/// Format records as consecutive entries separated by a blank line.
pub fn format_records(records: &[PublicationRecord]) -> Result<String, BibError> {
    let entries = records
        .iter()
        .map(format_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries.join("\n"))
}

/// Write records to `path`, replacing it. Returns the number of entries.
pub fn write_bib_file(path: &Path, records: &[PublicationRecord]) -> Result<usize, BibError> {
    let content = format_records(records)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), entries = records.len(), "bibliography written");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_bib_str;
    use bibsync_core::author_matches;

    fn article() -> PublicationRecord {
        PublicationRecord::new("Deep Learning Systems")
            .with_author("Jane Doe, John Smith")
            .with_year("2020")
            .with_doi("10.1234/dls")
            .with_container_title("Journal of Systems")
            .with_field("volume", "12")
            .with_derived_id()
    }

    #[test]
    fn formats_block_with_pruned_fields() {
        let out = format_record(&article()).unwrap();
        assert_eq!(
            out,
            "@article{10.1234/dls,\n\
             \x20   author = {Jane Doe and John Smith},\n\
             \x20   title = {Deep Learning Systems},\n\
             \x20   journal = {Journal of Systems},\n\
             \x20   year = {2020},\n\
             \x20   doi = {10.1234/dls},\n\
             \x20   volume = {12},\n\
             }\n"
        );
        assert!(!out.contains("publisher"));
    }

    #[test]
    fn authors_become_and_separated() {
        assert_eq!(bibtex_name_list("Jane Doe, John Smith"), "Jane Doe and John Smith");
        assert_eq!(bibtex_name_list(" Jane Doe ,, "), "Jane Doe");
    }

    #[test]
    fn proceedings_use_booktitle() {
        let mut record = article();
        record.entry_type = "inproceedings".into();
        let out = format_record(&record).unwrap();
        assert!(out.contains("booktitle = {Journal of Systems}"));
        assert!(!out.contains("journal ="));
    }

    #[test]
    fn missing_tags_are_errors() {
        let mut record = article();
        record.id.clear();
        match format_record(&record) {
            Err(BibError::MissingField { field, record }) => {
                assert_eq!(field, "id");
                assert_eq!(record, "Deep Learning Systems");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }

        let mut record = article();
        record.entry_type = "  ".into();
        assert!(matches!(
            format_record(&record),
            Err(BibError::MissingField { field: "entry_type", .. })
        ));
    }

    #[test]
    fn one_bad_record_fails_the_batch() {
        let mut bad = PublicationRecord::new("No id");
        bad.id.clear();
        assert!(format_records(&[article(), bad]).is_err());
    }

    #[test]
    fn written_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bib");
        let mut first = article();
        first.id = "doe2020deep".into();
        let second = PublicationRecord::new("Another Paper")
            .with_author("Jane Doe")
            .with_year("2021")
            .with_derived_id();

        let written = write_bib_file(&path, &[first, second.clone()]).unwrap();
        assert_eq!(written, 2);

        let parsed = parse_bib_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].title, "Deep Learning Systems");
        assert_eq!(parsed[0].author, "Jane Doe, John Smith");
        assert!(author_matches("Jane Doe", &parsed[0].author));
        assert!(author_matches("John Smith", &parsed[0].author));
        assert_eq!(parsed[0].container_title, "Journal of Systems");
        assert_eq!(parsed[1].id, second.id);
    }
}
