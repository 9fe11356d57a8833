//! Classification of local and crawled records into missing and extra sets.

use serde::Serialize;

use crate::dedup::dedup_by_title_and_doi;
use crate::matching::{ComparisonKey, Thresholds};
use crate::record::PublicationRecord;

/// Summary counts for one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub local_total: usize,
    pub crawled_total: usize,
    /// `local_total - extra`: local records confirmed by at least one source.
    pub common: usize,
    pub missing: usize,
    pub extra: usize,
}

/// Informational conditions that are not errors but leave a result empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notice {
    /// No source returned anything for the author.
    NoCrawledRecords,
    /// Sources returned records, but none in the requested years.
    NoCrawledRecordsForYears { years: Vec<String> },
    /// The local bibliography has nothing for this author and these years.
    NoLocalRecords,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::NoCrawledRecords => {
                write!(f, "no publications found in any source for this author")
            }
            Notice::NoCrawledRecordsForYears { years } => write!(
                f,
                "no crawled publications match the requested years ({})",
                years.join(", ")
            ),
            Notice::NoLocalRecords => {
                write!(f, "no local publications match this author and years")
            }
        }
    }
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    /// Crawled records with no similar local record.
    pub missing: Vec<PublicationRecord>,
    /// Local records with no similar crawled record.
    pub extra: Vec<PublicationRecord>,
    pub stats: ReconcileStats,
    pub notices: Vec<Notice>,
}

/// Compare a local record set against a crawled one.
///
/// `missing` and `extra` are computed in two independent passes because the
/// similarity relation is not symmetric (the DOI short-circuit only fires from
/// the side being classified). The missing set is then collapsed on exact
/// `(title, doi)` pairs.
///
/// Pairwise and O(|local| × |crawled|); each record is normalized once up
/// front.
pub fn reconcile(
    local: &[PublicationRecord],
    crawled: &[PublicationRecord],
    thresholds: &Thresholds,
) -> Reconciliation {
    let local_keys: Vec<ComparisonKey> = local.iter().map(ComparisonKey::of).collect();
    let crawled_keys: Vec<ComparisonKey> = crawled.iter().map(ComparisonKey::of).collect();

    let missing: Vec<PublicationRecord> = crawled
        .iter()
        .zip(&crawled_keys)
        .filter(|(_, ck)| !local_keys.iter().any(|lk| ck.similar_to(lk, thresholds)))
        .map(|(r, _)| r.clone())
        .collect();
    let missing = dedup_by_title_and_doi(missing);

    let extra: Vec<PublicationRecord> = local
        .iter()
        .zip(&local_keys)
        .filter(|(_, lk)| !crawled_keys.iter().any(|ck| lk.similar_to(ck, thresholds)))
        .map(|(r, _)| r.clone())
        .collect();

    let mut notices = Vec::new();
    if crawled.is_empty() {
        notices.push(Notice::NoCrawledRecords);
    }
    if local.is_empty() {
        notices.push(Notice::NoLocalRecords);
    }

    let stats = ReconcileStats {
        local_total: local.len(),
        crawled_total: crawled.len(),
        common: local.len().saturating_sub(extra.len()),
        missing: missing.len(),
        extra: extra.len(),
    };
    tracing::info!(
        local = stats.local_total,
        crawled = stats.crawled_total,
        common = stats.common,
        missing = stats.missing,
        extra = stats.extra,
        "reconciliation complete"
    );

    Reconciliation {
        missing,
        extra,
        stats,
        notices,
    }
}
