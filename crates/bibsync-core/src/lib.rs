use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod authors;
pub mod config_file;
pub mod db;
pub mod dedup;
pub mod export;
pub mod library;
pub mod matching;
pub mod normalize;
pub mod orchestrator;
pub mod pool;
pub mod rate_limit;
pub mod reconcile;
pub mod record;
pub mod session;

// Re-export for convenience
pub use authors::{AuthorCandidate, PersonName, author_matches, exact_author_match};
pub use db::{AuthorQuery, PublicationSource, SourceError};
pub use export::ExportError;
pub use library::{LocalLibrary, YearIndex, organize_by_year};
pub use matching::{Thresholds, similar, similarity_ratio};
pub use normalize::normalize_text;
pub use orchestrator::{FetchOutcome, SourceFailure, build_source_list, fetch_all_sources};
pub use pool::ReconcilePool;
pub use rate_limit::{FetchContext, RateLimiters};
pub use reconcile::{Notice, ReconcileStats, Reconciliation, reconcile};
pub use record::PublicationRecord;
pub use session::{CompareOutcome, CompareRequest, compare};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("{name} threshold must be between 0 and 100, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("the local bibliography contains no records")]
    EmptyLibrary,
    #[error("operation cancelled")]
    Cancelled,
    #[error("reconcile pool has shut down")]
    PoolClosed,
    #[error("reconciliation worker failed before producing a result")]
    ReconcileFailed,
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Progress events emitted during a comparison run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    FetchStarted {
        source: String,
    },
    FetchComplete {
        source: String,
        count: usize,
        elapsed: Duration,
    },
    SourceFailed {
        source: String,
        error: String,
    },
    Deduplicated {
        raw: usize,
        unique: usize,
    },
    YearFilter {
        years: Vec<String>,
        kept: usize,
    },
    LocalSelected {
        count: usize,
    },
    Reconciling {
        local: usize,
        crawled: usize,
    },
    Exported {
        path: PathBuf,
    },
}

/// Runtime configuration for a comparison run.
#[derive(Clone)]
pub struct Config {
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub crossref_max_results: usize,
    /// `YYYY-MM-DD` lower bound on Crossref publication dates.
    pub crossref_from_date: String,
    pub scholar_max_publications: usize,
    /// Source names to skip, compared case-insensitively.
    pub disabled_sources: Vec<String>,
    pub thresholds: Thresholds,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub num_workers: usize,
    /// Year-keyed JSON snapshot of the crawled records.
    pub snapshot_path: Option<PathBuf>,
    pub crawled_csv_path: Option<PathBuf>,
    pub rate_limiters: Arc<RateLimiters>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rebuild the limiters after API keys change; rates depend on them.
    pub fn refresh_rate_limiters(&mut self) {
        self.rate_limiters = Arc::new(RateLimiters::new(
            self.crossref_mailto.is_some(),
            self.s2_api_key.is_some(),
        ));
    }

    pub fn is_disabled(&self, source: &str) -> bool {
        self.disabled_sources
            .iter()
            .any(|d| d.eq_ignore_ascii_case(source))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("crossref_max_results", &self.crossref_max_results)
            .field("crossref_from_date", &self.crossref_from_date)
            .field("scholar_max_publications", &self.scholar_max_publications)
            .field("disabled_sources", &self.disabled_sources)
            .field("thresholds", &self.thresholds)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("num_workers", &self.num_workers)
            .field("snapshot_path", &self.snapshot_path)
            .field("crawled_csv_path", &self.crawled_csv_path)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            s2_api_key: None,
            crossref_mailto: None,
            crossref_max_results: 1000,
            crossref_from_date: "2000-01-01".to_string(),
            scholar_max_publications: 20,
            disabled_sources: vec![],
            thresholds: Thresholds::default(),
            timeout_secs: 30,
            max_retries: 5,
            num_workers: 2,
            snapshot_path: None,
            crawled_csv_path: None,
            rate_limiters: Arc::new(RateLimiters::default()),
        }
    }
}
