//! Per-source rate limiting and the shared HTTP request helper.
//!
//! Every outbound request waits for its source's governor permit. A 429 slows
//! the governor down, honors `Retry-After` once, and then gives up. Timeouts,
//! connection failures and 5xx responses are retried with exponential backoff.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::db::{CROSSREF, DBLP, GOOGLE_SCHOLAR, SEMANTIC_SCHOLAR, SourceError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Wait used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// First backoff step for transient failures; doubles per attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(100);

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Rate limiter that slows down on 429 and recovers after a quiet minute.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, ... capped at 16.
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        let limiter = Arc::new(DirectLimiter::direct(quota_for(period)));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    pub fn base_period(&self) -> Duration {
        self.base_period
    }

    pub fn slowdown_factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    /// Wait until the governor admits one more request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Double the slowdown factor and swap in a slower governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 60))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// One limiter per publication source, keyed by source name.
pub struct RateLimiters {
    limiters: HashMap<&'static str, Arc<AdaptiveLimiter>>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl RateLimiters {
    pub fn new(has_crossref_mailto: bool, has_s2_api_key: bool) -> Self {
        let mut limiters = HashMap::new();

        // Crossref polite pool allows more with a contact address.
        let crossref_rate = if has_crossref_mailto { 3 } else { 1 };
        limiters.insert(CROSSREF, Arc::new(AdaptiveLimiter::per_second(crossref_rate)));

        // Keyless Semantic Scholar is roughly 100 requests per 5 minutes.
        let s2 = if has_s2_api_key {
            AdaptiveLimiter::per_second(1)
        } else {
            AdaptiveLimiter::new(Duration::from_secs(3))
        };
        limiters.insert(SEMANTIC_SCHOLAR, Arc::new(s2));

        limiters.insert(GOOGLE_SCHOLAR, Arc::new(AdaptiveLimiter::per_second(1)));
        limiters.insert(DBLP, Arc::new(AdaptiveLimiter::per_second(1)));

        Self { limiters }
    }

    pub fn get(&self, source: &str) -> Option<Arc<AdaptiveLimiter>> {
        self.limiters.get(source).cloned()
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: not worth a date parser, assume a conservative wait.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Map a response status to `Ok` or the matching [`SourceError`].
pub fn check_status(resp: &reqwest::Response) -> Result<(), SourceError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(SourceError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    Ok(())
}

/// Backoff before retry number `attempt` (1-based): 100ms, 200ms, 400ms, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    BASE_BACKOFF.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Everything a source needs to issue HTTP requests.
#[derive(Clone)]
pub struct FetchContext {
    pub client: reqwest::Client,
    pub timeout: Duration,
    pub max_retries: u32,
    pub limiter: Option<Arc<AdaptiveLimiter>>,
}

impl FetchContext {
    pub fn new(client: reqwest::Client, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client,
            timeout,
            max_retries,
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Option<Arc<AdaptiveLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    async fn acquire(&self) {
        if let Some(lim) = &self.limiter {
            lim.acquire().await;
        }
    }

    /// Send a request with rate limiting and retries.
    ///
    /// Returns the response only for 2xx statuses.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SourceError> {
        let mut attempt = 0u32;
        let mut rate_limited = false;

        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| SourceError::Request("request cannot be retried".into()))?;
            self.acquire().await;

            let err = match req.timeout(self.timeout).send().await {
                Ok(resp) => match check_status(&resp) {
                    Ok(()) => return Ok(resp),
                    Err(e) => e,
                },
                Err(e) if e.is_timeout() || e.is_connect() => SourceError::Request(e.to_string()),
                Err(e) => return Err(SourceError::Request(e.to_string())),
            };

            match err {
                SourceError::RateLimited { retry_after } => {
                    if let Some(lim) = &self.limiter {
                        lim.on_rate_limited();
                    }
                    if rate_limited {
                        return Err(SourceError::RateLimited { retry_after });
                    }
                    rate_limited = true;
                    let wait = retry_after.unwrap_or(DEFAULT_RETRY_AFTER).min(self.timeout);
                    tracing::info!(
                        wait_secs = wait.as_secs_f64(),
                        "429 rate limited, waiting then retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                SourceError::Status(code) if code < 500 => {
                    return Err(SourceError::Status(code));
                }
                other => {
                    if attempt >= self.max_retries {
                        return Err(other);
                    }
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    tracing::debug!(attempt, error = %other, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub async fn get_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, SourceError> {
        let resp = self.send(request).await?;
        resp.json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    pub async fn get_text(&self, request: reqwest::RequestBuilder) -> Result<String, SourceError> {
        let resp = self.send(request).await?;
        resp.text()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::from_secs(0)));
    }

    #[test]
    fn parse_http_date_falls_back() {
        let val = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert_eq!(parse_retry_after(val), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn status_ok_on_200() {
        let resp = reqwest::Response::from(http::Response::builder().status(200).body("").unwrap());
        assert!(check_status(&resp).is_ok());
    }

    #[test]
    fn status_429_carries_retry_after() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "10")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        match check_status(&resp) {
            Err(SourceError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(10)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn status_other_errors() {
        let resp = reqwest::Response::from(http::Response::builder().status(503).body("").unwrap());
        assert!(matches!(check_status(&resp), Err(SourceError::Status(503))));
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn limiter_doubles_and_caps() {
        let limiter = AdaptiveLimiter::per_second(10);
        assert_eq!(limiter.slowdown_factor(), 1);
        limiter.on_rate_limited();
        assert_eq!(limiter.slowdown_factor(), 2);
        for _ in 0..10 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.slowdown_factor(), 16);
    }

    #[tokio::test]
    async fn decay_restores_after_quiet_minute() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        {
            let mut last = limiter.last_429.lock().unwrap();
            *last = Some(Instant::now() - Duration::from_secs(61));
        }
        limiter.acquire().await;
        assert_eq!(limiter.slowdown_factor(), 1);
    }

    #[test]
    fn registry_covers_every_source() {
        let limiters = RateLimiters::default();
        for name in [CROSSREF, SEMANTIC_SCHOLAR, GOOGLE_SCHOLAR, DBLP] {
            assert!(limiters.get(name).is_some(), "missing limiter for {name}");
        }
        assert!(limiters.get("Nowhere").is_none());
    }

    #[test]
    fn keys_speed_up_limits() {
        let slow = RateLimiters::new(false, false);
        let fast = RateLimiters::new(true, true);
        assert!(
            fast.get(CROSSREF).unwrap().base_period() < slow.get(CROSSREF).unwrap().base_period()
        );
        assert!(
            fast.get(SEMANTIC_SCHOLAR).unwrap().base_period()
                < slow.get(SEMANTIC_SCHOLAR).unwrap().base_period()
        );
    }
}
