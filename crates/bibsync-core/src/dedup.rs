//! Cross-source deduplication.

use std::collections::HashSet;

use crate::normalize::normalize_text;
use crate::record::PublicationRecord;

/// Keep the first record for each normalized title, preserving order.
///
/// The normalized title is the only key. DOIs are not consulted: sources
/// disagree on DOI availability, so two rows for the same title collapse even
/// when their DOIs differ. Records with an empty title all share the empty key
/// and therefore collapse into the first of them.
pub fn dedup_by_title(records: Vec<PublicationRecord>) -> Vec<PublicationRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let before = records.len();
    let unique: Vec<PublicationRecord> = records
        .into_iter()
        .filter(|r| seen.insert(normalize_text(&r.title)))
        .collect();
    tracing::debug!(before, after = unique.len(), "deduplicated by title");
    unique
}

/// Keep the first record for each exact `(title, doi)` pair.
///
/// Applied to the missing set only, where rows are compared verbatim.
pub fn dedup_by_title_and_doi(records: Vec<PublicationRecord>) -> Vec<PublicationRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert((r.title.clone(), r.doi.clone())))
        .collect()
}
