//! Publication sources: online services that list an author's publications.

pub mod crossref;
pub mod dblp;
pub mod google_scholar;
pub mod mock;
pub mod semantic_scholar;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::FetchContext;
use crate::record::PublicationRecord;

pub const CROSSREF: &str = "Crossref";
pub const SEMANTIC_SCHOLAR: &str = "Semantic Scholar";
pub const GOOGLE_SCHOLAR: &str = "Google Scholar";
pub const DBLP: &str = "DBLP";

/// The author being looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorQuery {
    pub first_name: String,
    pub last_name: String,
}

impl AuthorQuery {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
        }
    }

    /// "First Last".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// "F. Last", the form bibliographic indexes often use.
    pub fn initial_name(&self) -> String {
        match self.first_name.chars().next() {
            Some(c) => format!("{}. {}", c, self.last_name),
            None => self.last_name.clone(),
        }
    }
}

/// Why a source produced no records.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited (429){}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response: {0}")]
    Parse(String),
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {:.1}s", d.as_secs_f64()),
        None => String::new(),
    }
}

/// A service that can list the publications of an author.
///
/// Implementations normalize their payloads into [`PublicationRecord`]s and
/// drop entries that do not match the queried author.
pub trait PublicationSource: Send + Sync {
    /// Display name, also the key for rate limiting and disabling.
    fn name(&self) -> &str;

    fn fetch<'a>(
        &'a self,
        query: &'a AuthorQuery,
        ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>;
}
