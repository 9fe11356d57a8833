use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::db::{
    AuthorQuery, CROSSREF, DBLP, GOOGLE_SCHOLAR, PublicationSource, SEMANTIC_SCHOLAR, SourceError,
};
use crate::dedup::dedup_by_title;
use crate::rate_limit::FetchContext;
use crate::record::PublicationRecord;
use crate::{Config, CoreError, ProgressEvent};

/// A source that produced no records because its fetch failed.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

/// Records contributed by one successful source.
#[derive(Debug, Clone)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
    pub elapsed: Duration,
}

/// Result of fetching one author from every selected source.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Deduplicated records, in source order.
    pub records: Vec<PublicationRecord>,
    /// Record count before deduplication.
    pub raw_count: usize,
    pub per_source: Vec<SourceCount>,
    pub failures: Vec<SourceFailure>,
}

/// Build the sources to query, honoring `disabled_sources` and an optional
/// allow-list (both case-insensitive). Order is Crossref, Semantic Scholar,
/// Google Scholar, DBLP.
pub fn build_source_list(
    config: &Config,
    only: Option<&[String]>,
) -> Vec<Arc<dyn PublicationSource>> {
    use crate::db::*;

    let should_include = |name: &str| -> bool {
        if config.is_disabled(name) {
            return false;
        }
        match only {
            Some(names) => names.iter().any(|n| n.trim().eq_ignore_ascii_case(name)),
            None => true,
        }
    };

    let mut sources: Vec<Arc<dyn PublicationSource>> = Vec::new();
    if should_include(CROSSREF) {
        sources.push(Arc::new(crossref::Crossref {
            mailto: config.crossref_mailto.clone(),
            max_results: config.crossref_max_results,
            from_date: config.crossref_from_date.clone(),
        }));
    }
    if should_include(SEMANTIC_SCHOLAR) {
        sources.push(Arc::new(semantic_scholar::SemanticScholar {
            api_key: config.s2_api_key.clone(),
        }));
    }
    if should_include(GOOGLE_SCHOLAR) {
        sources.push(Arc::new(google_scholar::GoogleScholar {
            max_publications: config.scholar_max_publications,
        }));
    }
    if should_include(DBLP) {
        sources.push(Arc::new(dblp::DblpOnline));
    }
    sources
}

/// Fetch `query` from all `sources` concurrently.
///
/// A failing source is logged, reported as [`ProgressEvent::SourceFailed`]
/// and contributes zero records; the others are unaffected. Results are
/// concatenated in the order of `sources`, not completion order, before
/// title deduplication.
pub async fn fetch_all_sources(
    query: &AuthorQuery,
    sources: &[Arc<dyn PublicationSource>],
    config: &Config,
    client: &reqwest::Client,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<FetchOutcome, CoreError> {
    let mut join_set = tokio::task::JoinSet::new();
    let mut task_index = HashMap::new();

    for (index, source) in sources.iter().enumerate() {
        let source = Arc::clone(source);
        let query = query.clone();
        let ctx = FetchContext::new(client.clone(), config.timeout(), config.max_retries)
            .with_limiter(config.rate_limiters.get(source.name()));

        progress(ProgressEvent::FetchStarted {
            source: source.name().to_string(),
        });
        let handle = join_set.spawn(async move {
            let start = Instant::now();
            let result = source.fetch(&query, &ctx).await;
            (index, result, start.elapsed())
        });
        task_index.insert(handle.id(), index);
    }

    let mut slots: Vec<Option<(Result<Vec<PublicationRecord>, SourceError>, Duration)>> =
        (0..sources.len()).map(|_| None).collect();

    loop {
        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                join_set.abort_all();
                return Err(CoreError::Cancelled);
            }
            joined = join_set.join_next_with_id() => joined,
        };
        let Some(joined) = joined else { break };
        match joined {
            Ok((_, (index, result, elapsed))) => slots[index] = Some((result, elapsed)),
            Err(e) => {
                if let Some(&index) = task_index.get(&e.id()) {
                    let error = SourceError::Request(format!("source task failed: {e}"));
                    slots[index] = Some((Err(error), Duration::ZERO));
                }
            }
        }
    }

    let mut outcome = FetchOutcome::default();
    let mut raw = Vec::new();

    for (source, slot) in sources.iter().zip(slots) {
        let name = source.name().to_string();
        let (result, elapsed) = slot.unwrap_or_else(|| {
            (
                Err(SourceError::Request("source task did not complete".into())),
                Duration::ZERO,
            )
        });
        match result {
            Ok(records) => {
                tracing::info!(source = %name, count = records.len(), "fetch complete");
                progress(ProgressEvent::FetchComplete {
                    source: name.clone(),
                    count: records.len(),
                    elapsed,
                });
                outcome.per_source.push(SourceCount {
                    source: name,
                    count: records.len(),
                    elapsed,
                });
                raw.extend(records);
            }
            Err(error) => {
                tracing::warn!(source = %name, error = %error, "fetch failed");
                progress(ProgressEvent::SourceFailed {
                    source: name.clone(),
                    error: error.to_string(),
                });
                outcome.failures.push(SourceFailure {
                    source: name,
                    error,
                });
            }
        }
    }

    outcome.raw_count = raw.len();
    outcome.records = dedup_by_title(raw);
    progress(ProgressEvent::Deduplicated {
        raw: outcome.raw_count,
        unique: outcome.records.len(),
    });
    Ok(outcome)
}
