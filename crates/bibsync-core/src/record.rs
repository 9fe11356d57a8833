//! The canonical publication record every source is normalized into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::normalize_text;

/// Entry type used when a source does not say otherwise.
pub const DEFAULT_ENTRY_TYPE: &str = "article";

/// Placeholder year for records whose source carries no date.
pub const UNKNOWN_YEAR: &str = "Unknown";

/// A single bibliographic record.
///
/// The common fields are typed; everything else (ISSN, volume, abstract, ...)
/// lives in `extra` under lowercase field names. Empty strings mean "absent"
/// and are pruned on every serialization path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    #[serde(default)]
    pub entry_type: String,
    #[serde(default)]
    pub id: String,
    /// "Given Family, Given Family, ..."
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub year: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doi: String,
    #[serde(
        default,
        rename = "container-title",
        skip_serializing_if = "String::is_empty"
    )]
    pub container_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub publisher: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Names of the typed body fields, in output order.
pub const CORE_FIELDS: [&str; 6] = [
    "author",
    "title",
    "container-title",
    "year",
    "doi",
    "publisher",
];

impl PublicationRecord {
    /// Start a record with the given title and the default entry type.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            entry_type: DEFAULT_ENTRY_TYPE.to_string(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = year.into();
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = doi.into();
        self
    }

    pub fn with_container_title(mut self, container: impl Into<String>) -> Self {
        self.container_title = container.into();
        self
    }

    pub fn with_field(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Fill in `entry_type` and `id` if they are still empty.
    pub fn with_derived_id(mut self) -> Self {
        self.ensure_tags();
        self
    }

    /// Ensure the two mandatory tagging fields are populated.
    pub fn ensure_tags(&mut self) {
        if self.entry_type.trim().is_empty() {
            self.entry_type = DEFAULT_ENTRY_TYPE.to_string();
        }
        if self.id.trim().is_empty() {
            self.id = derive_record_id(&self.doi, &self.title);
        }
    }

    /// Look up a field by name (case-insensitive). Empty values read as absent.
    pub fn get(&self, field: &str) -> Option<&str> {
        let field = field.to_ascii_lowercase();
        let value = match field.as_str() {
            "entry_type" | "entrytype" => self.entry_type.as_str(),
            "id" => self.id.as_str(),
            "author" => self.author.as_str(),
            "year" => self.year.as_str(),
            "title" => self.title.as_str(),
            "doi" => self.doi.as_str(),
            "container-title" => self.container_title.as_str(),
            "publisher" => self.publisher.as_str(),
            other => self.extra.get(other).map(String::as_str).unwrap_or(""),
        };
        if value.is_empty() { None } else { Some(value) }
    }

    /// Set a field by name. Unknown names go into `extra`, lowercased.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        let field = field.to_ascii_lowercase();
        match field.as_str() {
            "entry_type" | "entrytype" => self.entry_type = value,
            "id" => self.id = value,
            "author" => self.author = value,
            "year" => self.year = value,
            "title" => self.title = value,
            "doi" => self.doi = value,
            "container-title" => self.container_title = value,
            "publisher" => self.publisher = value,
            _ => {
                self.extra.insert(field, value);
            }
        }
    }

    /// Non-empty body fields (everything except `entry_type`/`id`), typed
    /// fields first, then extras in name order.
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let typed = [
            ("author", self.author.as_str()),
            ("title", self.title.as_str()),
            ("container-title", self.container_title.as_str()),
            ("year", self.year.as_str()),
            ("doi", self.doi.as_str()),
            ("publisher", self.publisher.as_str()),
        ];
        typed
            .into_iter()
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect()
    }

    /// Year if known, otherwise [`UNKNOWN_YEAR`].
    pub fn year_or_unknown(&self) -> &str {
        if self.year.trim().is_empty() {
            UNKNOWN_YEAR
        } else {
            self.year.trim()
        }
    }
}

/// Stable record key: the DOI when present, else `key` + 16 hex digits of the
/// SHA-256 of the normalized, punctuation-free title.
pub fn derive_record_id(doi: &str, title: &str) -> String {
    let doi = doi.trim();
    if !doi.is_empty() {
        return doi.to_string();
    }
    let sanitized: String = normalize_text(title)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let digest = Sha256::digest(sanitized.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("key{hex}")
}
