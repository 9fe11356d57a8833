//! One end-to-end comparison: fetch, deduplicate, filter by year, select the
//! local records, reconcile, export.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::db::{AuthorQuery, PublicationSource};
use crate::export::{write_crawled_csv, write_snapshot};
use crate::library::{LocalLibrary, organize_by_year};
use crate::orchestrator::{FetchOutcome, fetch_all_sources};
use crate::pool::ReconcilePool;
use crate::reconcile::{Notice, Reconciliation};
use crate::record::PublicationRecord;
use crate::{Config, CoreError, ProgressEvent};

/// What to compare.
pub struct CompareRequest {
    pub query: AuthorQuery,
    /// Year labels to keep, e.g. `["2020", "2021"]`.
    pub years: Vec<String>,
    pub sources: Vec<Arc<dyn PublicationSource>>,
}

#[derive(Debug, Clone, Default)]
pub struct CompareOutcome {
    pub fetch: FetchOutcome,
    /// Deduplicated crawled records within the requested years.
    pub crawled_in_years: Vec<PublicationRecord>,
    /// Local records within the requested years that list the author.
    pub local_selected: Vec<PublicationRecord>,
    /// `None` when there was nothing crawled to compare against.
    pub reconciliation: Option<Reconciliation>,
    pub notices: Vec<Notice>,
}

/// HTTP client shared by every source in a run.
pub fn build_client(config: &Config) -> Result<reqwest::Client, CoreError> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .connect_timeout(config.timeout())
        .build()?;
    Ok(client)
}

fn validate(library: &LocalLibrary, request: &CompareRequest) -> Result<(), CoreError> {
    if request.query.first_name.is_empty() || request.query.last_name.is_empty() {
        return Err(CoreError::InvalidQuery(
            "both a first and a last name are required".into(),
        ));
    }
    if request.years.iter().all(|y| y.trim().is_empty()) {
        return Err(CoreError::InvalidQuery("no years selected".into()));
    }
    if request.sources.is_empty() {
        return Err(CoreError::InvalidQuery("no sources selected".into()));
    }
    if library.is_empty() {
        return Err(CoreError::EmptyLibrary);
    }
    Ok(())
}

/// Wait for a submitted job. A dropped result sender means the worker died
/// unless the run was cancelled.
async fn await_reconciliation(
    rx: oneshot::Receiver<Reconciliation>,
    cancel: &CancellationToken,
) -> Result<Reconciliation, CoreError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
        result = rx => match result {
            Ok(reconciliation) => Ok(reconciliation),
            Err(_) if cancel.is_cancelled() => Err(CoreError::Cancelled),
            Err(_) => {
                tracing::error!("reconcile worker dropped the job without a result");
                Err(CoreError::ReconcileFailed)
            }
        },
    }
}

/// Run one comparison.
///
/// Soft empty results (nothing crawled, nothing in the requested years) are
/// reported through [`CompareOutcome::notices`], not as errors.
pub async fn compare(
    library: &LocalLibrary,
    request: &CompareRequest,
    config: &Config,
    pool: &ReconcilePool,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<CompareOutcome, CoreError> {
    validate(library, request)?;
    config.thresholds.validate()?;
    let years: Vec<String> = request
        .years
        .iter()
        .map(|y| y.trim().to_string())
        .filter(|y| !y.is_empty())
        .collect();

    tracing::info!(
        author = %request.query.full_name(),
        years = ?years,
        sources = request.sources.len(),
        "starting comparison"
    );

    let client = build_client(config)?;
    let fetch = fetch_all_sources(
        &request.query,
        &request.sources,
        config,
        &client,
        progress,
        cancel,
    )
    .await?;

    let mut outcome = CompareOutcome {
        fetch,
        ..Default::default()
    };

    if outcome.fetch.records.is_empty() {
        tracing::info!("no publications found in any source");
        outcome.notices.push(Notice::NoCrawledRecords);
        return Ok(outcome);
    }

    if let Some(path) = &config.crawled_csv_path {
        write_crawled_csv(path, &outcome.fetch.records)?;
        progress(ProgressEvent::Exported { path: path.clone() });
    }
    if let Some(path) = &config.snapshot_path {
        write_snapshot(path, &organize_by_year(outcome.fetch.records.clone()))?;
        progress(ProgressEvent::Exported { path: path.clone() });
    }

    outcome.crawled_in_years = outcome
        .fetch
        .records
        .iter()
        .filter(|r| years.iter().any(|y| y == r.year_or_unknown()))
        .cloned()
        .collect();
    progress(ProgressEvent::YearFilter {
        years: years.clone(),
        kept: outcome.crawled_in_years.len(),
    });
    if outcome.crawled_in_years.is_empty() {
        tracing::info!(years = ?years, "no crawled publications in the requested years");
        outcome
            .notices
            .push(Notice::NoCrawledRecordsForYears { years });
        return Ok(outcome);
    }

    outcome.local_selected = library.select(&years, &request.query);
    progress(ProgressEvent::LocalSelected {
        count: outcome.local_selected.len(),
    });

    progress(ProgressEvent::Reconciling {
        local: outcome.local_selected.len(),
        crawled: outcome.crawled_in_years.len(),
    });
    let rx = pool
        .submit(
            outcome.local_selected.clone(),
            outcome.crawled_in_years.clone(),
            config.thresholds,
        )
        .await?;
    let reconciliation = await_reconciliation(rx, cancel).await?;

    outcome.notices.extend(reconciliation.notices.iter().cloned());
    outcome.reconciliation = Some(reconciliation);
    Ok(outcome)
}
