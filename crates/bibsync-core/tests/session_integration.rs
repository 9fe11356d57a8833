//! End-to-end comparison runs against in-memory sources.
//!
//! Every source here is a [`MockSource`], so no HTTP requests are made.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bibsync_core::db::mock::MockSource;
use bibsync_core::{
    AuthorQuery, CompareRequest, Config, CoreError, LocalLibrary, Notice, ProgressEvent,
    PublicationRecord, PublicationSource, ReconcilePool, compare, fetch_all_sources,
};
use tokio_util::sync::CancellationToken;

fn local_library() -> LocalLibrary {
    LocalLibrary::from_records(vec![
        PublicationRecord::new("Deep Learning Systems")
            .with_author("Jane Doe")
            .with_year("2020"),
        PublicationRecord::new("An Old Paper Nobody Indexed")
            .with_author("Jane Doe, John Smith")
            .with_year("2020"),
        PublicationRecord::new("Written By Someone Else")
            .with_author("John Smith")
            .with_year("2020"),
    ])
}

fn request(years: &[&str], sources: Vec<Arc<dyn PublicationSource>>) -> CompareRequest {
    CompareRequest {
        query: AuthorQuery::new("Jane", "Doe"),
        years: years.iter().map(|y| y.to_string()).collect(),
        sources,
    }
}

type Events = Arc<Mutex<Vec<ProgressEvent>>>;

fn collector() -> (Events, impl Fn(ProgressEvent) + Send + Sync) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |e| sink.lock().unwrap().push(e))
}

#[tokio::test]
async fn initials_and_case_variants_reconcile_cleanly() {
    let library = LocalLibrary::from_records(vec![
        PublicationRecord::new("Deep Learning Systems")
            .with_author("Jane Doe")
            .with_year("2020"),
    ]);
    let source = MockSource::with_records(
        "Mock",
        vec![
            PublicationRecord::new("Deep learning systems")
                .with_author("J. Doe")
                .with_year("2020"),
        ],
    );
    let req = request(&["2020"], vec![Arc::new(source)]);
    let config = Config::default();
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();

    let outcome = compare(&library, &req, &config, &pool, &progress, &CancellationToken::new())
        .await
        .unwrap();
    let rec = outcome.reconciliation.unwrap();
    assert!(rec.missing.is_empty());
    assert!(rec.extra.is_empty());
    assert_eq!(rec.stats.common, 1);
    assert!(outcome.notices.is_empty());
    pool.shutdown().await;
}

#[tokio::test]
async fn missing_and_extra_are_reported() {
    let source = MockSource::with_records(
        "Mock",
        vec![
            PublicationRecord::new("Deep Learning Systems")
                .with_author("Jane Doe")
                .with_year("2020"),
            PublicationRecord::new("A Brand New Result")
                .with_author("Jane Doe")
                .with_year("2020")
                .with_doi("10.1/new"),
            PublicationRecord::new("From Another Year")
                .with_author("Jane Doe")
                .with_year("2019"),
        ],
    );
    let req = request(&["2020"], vec![Arc::new(source)]);
    let pool = ReconcilePool::new(2, CancellationToken::new());
    let (events, progress) = collector();

    let outcome = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.fetch.raw_count, 3);
    assert_eq!(outcome.crawled_in_years.len(), 2);
    // "Written By Someone Else" does not list Jane Doe.
    assert_eq!(outcome.local_selected.len(), 2);

    let rec = outcome.reconciliation.unwrap();
    assert_eq!(rec.missing.len(), 1);
    assert_eq!(rec.missing[0].doi, "10.1/new");
    assert_eq!(rec.extra.len(), 1);
    assert_eq!(rec.extra[0].title, "An Old Paper Nobody Indexed");
    assert_eq!(rec.stats.local_total, 2);
    assert_eq!(rec.stats.crawled_total, 2);
    assert_eq!(rec.stats.common, 1);

    let events = events.lock().unwrap();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ProgressEvent::YearFilter { kept: 2, .. }))
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Reconciling { local: 2, crawled: 2 }))
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn failing_source_does_not_abort_others() {
    let good = MockSource::with_records(
        "Good",
        vec![
            PublicationRecord::new("Deep Learning Systems")
                .with_author("Jane Doe")
                .with_year("2020"),
        ],
    );
    let broken = MockSource::failing("Broken", "connection refused");
    let req = request(&["2020"], vec![Arc::new(broken), Arc::new(good)]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (events, progress) = collector();

    let outcome = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.fetch.failures.len(), 1);
    assert_eq!(outcome.fetch.failures[0].source, "Broken");
    assert_eq!(outcome.fetch.per_source.len(), 1);
    assert_eq!(outcome.fetch.records.len(), 1);
    assert!(outcome.reconciliation.is_some());

    let events = events.lock().unwrap();
    assert!(events.iter().any(
        |e| matches!(e, ProgressEvent::SourceFailed { source, .. } if source == "Broken")
    ));
    pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn concatenation_follows_source_order_not_completion_order() {
    let slow = MockSource::with_records(
        "Slow",
        vec![PublicationRecord::new("Shared Title").with_doi("10.1/slow")],
    )
    .with_delay(Duration::from_secs(3));
    let fast = MockSource::with_records(
        "Fast",
        vec![PublicationRecord::new("shared title").with_doi("10.1/fast")],
    );
    let sources: Vec<Arc<dyn PublicationSource>> = vec![Arc::new(slow), Arc::new(fast)];
    let (_events, progress) = collector();

    let outcome = fetch_all_sources(
        &AuthorQuery::new("Jane", "Doe"),
        &sources,
        &Config::default(),
        &reqwest::Client::new(),
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.raw_count, 2);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].doi, "10.1/slow");
}

#[tokio::test]
async fn nothing_crawled_is_a_notice() {
    let req = request(&["2020"], vec![Arc::new(MockSource::with_records("Empty", vec![]))]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();

    let outcome = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(outcome.reconciliation.is_none());
    assert_eq!(outcome.notices, vec![Notice::NoCrawledRecords]);
    pool.shutdown().await;
}

#[tokio::test]
async fn nothing_in_requested_years_is_a_notice() {
    let source = MockSource::with_records(
        "Mock",
        vec![PublicationRecord::new("Old").with_author("Jane Doe").with_year("2015")],
    );
    let req = request(&["2020", "2021"], vec![Arc::new(source)]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();

    let outcome = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(outcome.reconciliation.is_none());
    assert_eq!(
        outcome.notices,
        vec![Notice::NoCrawledRecordsForYears {
            years: vec!["2020".into(), "2021".into()]
        }]
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn no_matching_local_records_still_reconciles() {
    let source = MockSource::with_records(
        "Mock",
        vec![PublicationRecord::new("Fresh").with_author("Jane Doe").with_year("2021")],
    );
    let req = request(&["2021"], vec![Arc::new(source)]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();

    let outcome = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let rec = outcome.reconciliation.unwrap();
    assert_eq!(rec.missing.len(), 1);
    assert!(rec.extra.is_empty());
    assert_eq!(outcome.notices, vec![Notice::NoLocalRecords]);
    pool.shutdown().await;
}

#[tokio::test]
async fn exports_are_written_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: Some(dir.path().join("snapshot.json")),
        crawled_csv_path: Some(dir.path().join("crawled.csv")),
        ..Default::default()
    };
    let source = MockSource::with_records(
        "Mock",
        vec![
            PublicationRecord::new("Deep Learning Systems")
                .with_author("Jane Doe")
                .with_year("2020")
                .with_derived_id(),
            PublicationRecord::new("Undated").with_derived_id(),
        ],
    );
    let req = request(&["2020"], vec![Arc::new(source)]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (events, progress) = collector();

    compare(&local_library(), &req, &config, &pool, &progress, &CancellationToken::new())
        .await
        .unwrap();

    let snapshot = bibsync_core::export::read_snapshot(&dir.path().join("snapshot.json")).unwrap();
    assert_eq!(snapshot["2020"].len(), 1);
    assert_eq!(snapshot["Unknown"].len(), 1);
    assert!(dir.path().join("crawled.csv").exists());
    let exported = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Exported { .. }))
        .count();
    assert_eq!(exported, 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();
    let config = Config::default();
    let cancel = CancellationToken::new();
    let mock = MockSource::with_records("Mock", vec![]);
    let source: Arc<dyn PublicationSource> = Arc::new(mock);

    let mut req = request(&["2020"], vec![Arc::clone(&source)]);
    req.query = AuthorQuery::new("", "Doe");
    let err = compare(&local_library(), &req, &config, &pool, &progress, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery(_)));

    let req = request(&[], vec![Arc::clone(&source)]);
    let err = compare(&local_library(), &req, &config, &pool, &progress, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery(_)));

    let req = request(&["2020"], vec![]);
    let err = compare(&local_library(), &req, &config, &pool, &progress, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery(_)));

    let req = request(&["2020"], vec![Arc::clone(&source)]);
    let err = compare(
        &LocalLibrary::from_records(vec![]),
        &req,
        &config,
        &pool,
        &progress,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::EmptyLibrary));

    let mut bad_config = Config::default();
    bad_config.thresholds.title = 150.0;
    let req = request(&["2020"], vec![Arc::clone(&source)]);
    let err = compare(&local_library(), &req, &bad_config, &pool, &progress, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidThreshold { name: "title", .. }
    ));
    pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_fetching() {
    let slow = MockSource::with_records("Slow", vec![PublicationRecord::new("Never")])
        .with_delay(Duration::from_secs(600));
    let req = request(&["2020"], vec![Arc::new(slow)]);
    let pool = ReconcilePool::new(1, CancellationToken::new());
    let (_events, progress) = collector();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = compare(
        &local_library(),
        &req,
        &Config::default(),
        &pool,
        &progress,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    pool.shutdown().await;
}
