pub mod completion;
pub mod latex;
pub mod writer;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use bibsync_core::{LocalLibrary, PublicationRecord};

pub use completion::{Btac, CompletionError, CompletionOracle, seed_record};
pub use latex::{preprocess_bib_file, preprocess_latex_characters};
pub use writer::{format_record, format_records, write_bib_file};

#[derive(Error, Debug)]
pub enum BibError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no BibTeX entries found")]
    NoBibEntries,
    #[error("record '{record}' has no {field}")]
    MissingField { field: &'static str, record: String },
}

/// Fields consumed into the typed part of [`PublicationRecord`].
const MAPPED_FIELDS: [&str; 9] = [
    "author",
    "title",
    "year",
    "date",
    "doi",
    "journal",
    "journaltitle",
    "booktitle",
    "publisher",
];

/// Read a .bib file into records, one per entry, in file order.
pub fn read_bib_file(path: &Path) -> Result<Vec<PublicationRecord>, BibError> {
    let content = std::fs::read_to_string(path)?;
    let records = parse_bib_str(&content)?;
    tracing::info!(path = %path.display(), entries = records.len(), "bibliography loaded");
    Ok(records)
}

/// Read a .bib file straight into a year-partitioned library.
pub fn read_library(path: &Path) -> Result<LocalLibrary, BibError> {
    Ok(LocalLibrary::from_records(read_bib_file(path)?))
}

/// Parse .bib content from a string.
pub fn parse_bib_str(content: &str) -> Result<Vec<PublicationRecord>, BibError> {
    match biblatex::Bibliography::parse(content) {
        Ok(bibliography) => {
            let records: Vec<_> = bibliography.iter().map(entry_to_record).collect();
            if records.is_empty() {
                return Err(BibError::NoBibEntries);
            }
            Ok(records)
        }
        Err(e) => {
            // One malformed entry fails the whole-file parse; recover the rest.
            tracing::debug!(error = %e, "whole-file parse failed, parsing entries individually");
            parse_bib_entries_individually(content)
        }
    }
}

fn parse_bib_entries_individually(content: &str) -> Result<Vec<PublicationRecord>, BibError> {
    static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*@[a-zA-Z]").unwrap());

    let positions: Vec<usize> = ENTRY_RE.find_iter(content).map(|m| m.start()).collect();
    if positions.is_empty() {
        return Err(BibError::NoBibEntries);
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (i, &start) in positions.iter().enumerate() {
        let end = positions.get(i + 1).copied().unwrap_or(content.len());
        match biblatex::Bibliography::parse(&content[start..end]) {
            Ok(bib) => records.extend(bib.iter().map(entry_to_record)),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, kept = records.len(), "skipped unparseable BibTeX entries");
    }
    if records.is_empty() {
        return Err(BibError::NoBibEntries);
    }
    Ok(records)
}

fn entry_to_record(entry: &biblatex::Entry) -> PublicationRecord {
    let field = |name: &str| {
        entry
            .get(name)
            .map(chunks_to_string)
            .filter(|s| !s.is_empty())
    };

    let author = entry
        .author()
        .unwrap_or_default()
        .iter()
        .filter(|p| p.name != "others")
        .filter(|p| !p.name.is_empty() || !p.given_name.is_empty())
        .map(format_bib_person)
        .collect::<Vec<_>>()
        .join(", ");

    let year = field("year")
        .or_else(|| field("date").and_then(|d| year_from_date(&d)))
        .unwrap_or_default();

    let mut record = PublicationRecord {
        entry_type: entry.entry_type.to_string().to_lowercase(),
        id: entry.key.trim().to_string(),
        author,
        year,
        title: field("title").unwrap_or_default(),
        doi: field("doi").unwrap_or_default(),
        container_title: field("journal")
            .or_else(|| field("journaltitle"))
            .or_else(|| field("booktitle"))
            .unwrap_or_default(),
        publisher: field("publisher").unwrap_or_default(),
        ..Default::default()
    };

    for (name, chunks) in &entry.fields {
        if MAPPED_FIELDS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        let value = chunks_to_string(chunks);
        if !value.is_empty() {
            record.set(name, value);
        }
    }

    record.ensure_tags();
    record
}

fn year_from_date(date: &str) -> Option<String> {
    let year: String = date.chars().take(4).collect();
    (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then_some(year)
}

/// Convert biblatex chunks to a plain string with whitespace collapsed.
fn chunks_to_string(chunks: &[biblatex::Spanned<biblatex::Chunk>]) -> String {
    let joined: String = chunks
        .iter()
        .map(|c| match &c.v {
            biblatex::Chunk::Normal(s) => s.as_str(),
            biblatex::Chunk::Verbatim(s) => s.as_str(),
            biblatex::Chunk::Math(s) => s.as_str(),
        })
        .collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a biblatex Person as "Given Family" (western name order).
fn format_bib_person(p: &biblatex::Person) -> String {
    [
        p.given_name.as_str(),
        p.prefix.as_str(),
        p.name.as_str(),
        p.suffix.as_str(),
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}
