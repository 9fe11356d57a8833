//! In-memory publication source for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AuthorQuery, PublicationSource, SourceError};
use crate::rate_limit::FetchContext;
use crate::record::PublicationRecord;

/// A configurable response for [`MockSource`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    Records(Vec<PublicationRecord>),
    RateLimited { retry_after: Option<Duration> },
    Error(String),
}

/// A hand-rolled [`PublicationSource`] with a fixed or sequenced response,
/// optional latency and call counting. Makes no HTTP requests.
pub struct MockSource {
    name: String,
    /// Popped one per call; `fallback` once exhausted.
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockSource {
    pub fn new(name: impl Into<String>, response: MockResponse) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_records(name: impl Into<String>, records: Vec<PublicationRecord>) -> Self {
        Self::new(name, MockResponse::Records(records))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, MockResponse::Error(message.into()))
    }

    /// Responses in order, then `fallback` forever.
    pub fn with_sequence(mut self, mut responses: Vec<MockResponse>) -> Self {
        responses.reverse();
        self.responses = Mutex::new(responses);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        match self.responses.lock() {
            Ok(mut seq) => seq.pop().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

impl PublicationSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(
        &'a self,
        _query: &'a AuthorQuery,
        _ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>
    {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Records(records) => Ok(records),
                MockResponse::RateLimited { retry_after } => {
                    Err(SourceError::RateLimited { retry_after })
                }
                MockResponse::Error(msg) => Err(SourceError::Request(msg)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FetchContext {
        FetchContext::new(reqwest::Client::new(), Duration::from_secs(1), 0)
    }

    #[tokio::test]
    async fn sequence_then_fallback() {
        let mock = MockSource::with_records("M", vec![PublicationRecord::new("fallback")])
            .with_sequence(vec![MockResponse::Error("boom".into())]);
        let q = AuthorQuery::new("Jane", "Doe");
        let ctx = ctx();

        assert!(mock.fetch(&q, &ctx).await.is_err());
        let second = mock.fetch(&q, &ctx).await.unwrap();
        assert_eq!(second[0].title, "fallback");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_simulated() {
        let mock = MockSource::with_records("M", vec![]).with_delay(Duration::from_secs(5));
        let q = AuthorQuery::new("Jane", "Doe");
        let start = tokio::time::Instant::now();
        mock.fetch(&q, &ctx()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
