//! Fuzzy equivalence between a local and a crawled record.

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::normalize::normalize_for_comparison;
use crate::record::PublicationRecord;

pub const DEFAULT_DOI_THRESHOLD: f64 = 90.0;
pub const DEFAULT_TITLE_THRESHOLD: f64 = 80.0;

/// Minimum similarity ratios (0–100) for the DOI and title checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub doi: f64,
    pub title: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            doi: DEFAULT_DOI_THRESHOLD,
            title: DEFAULT_TITLE_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Both thresholds must lie in `0..=100`. NaN is rejected.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, value) in [("DOI", self.doi), ("title", self.title)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(CoreError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}

/// Edit-distance similarity of two strings as a percentage.
///
/// Symmetric; 100 for identical strings (including two empty strings), 0 when
/// nothing is shared. Rounded to 1e-6 so ratios that are exactly representable
/// as fractions compare cleanly against integer thresholds.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    let score = rapidfuzz::fuzz::ratio(a.chars(), b.chars()) * 100.0;
    (score * 1e6).round() / 1e6
}

/// The normalized DOI and title of a record, computed once per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonKey {
    pub doi: String,
    pub title: String,
}

impl ComparisonKey {
    pub fn of(record: &PublicationRecord) -> Self {
        Self {
            doi: normalize_for_comparison(&record.doi),
            title: normalize_for_comparison(&record.title),
        }
    }

    /// Whether `self` (the record being classified) is similar to `other`.
    ///
    /// A confident DOI match short-circuits, but only when `self` actually has
    /// a DOI; two DOI-less records must be decided by their titles.
    pub fn similar_to(&self, other: &ComparisonKey, thresholds: &Thresholds) -> bool {
        if !self.doi.is_empty() && similarity_ratio(&self.doi, &other.doi) >= thresholds.doi {
            return true;
        }
        similarity_ratio(&self.title, &other.title) >= thresholds.title
    }
}

/// Whether two records describe the same publication.
pub fn similar(a: &PublicationRecord, b: &PublicationRecord, thresholds: &Thresholds) -> bool {
    ComparisonKey::of(a).similar_to(&ComparisonKey::of(b), thresholds)
}
