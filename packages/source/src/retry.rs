//! Resilient document download.
//!
//! All platform requests go through [`ResilientFetcher::fetch`], which
//! retries rate limiting (HTTP 429), server errors (HTTP 500/502/503/504),
//! blank success bodies and transport failures with exponential backoff.
//! Any other status is permanent and surfaces immediately.
//!
//! The HTTP client itself sits behind [`HttpTransport`] so the retry loop
//! can be driven by a scripted transport in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret as _, SecretString};

use crate::cancel::Cancellation;
use crate::xml::reason_summary;
use crate::{FetchError, FetchErrorKind};

/// Public REST endpoint of the transparency platform.
pub const DEFAULT_BASE_URL: &str = "https://web-api.tp.entsoe.eu/api";

/// Statuses that are worth retrying.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Maximum length of the response body included in error details.
const BODY_PREVIEW_LEN: usize = 300;

/// Query parameter carrying the access token.
const TOKEN_PARAM: &str = "securityToken";

/// A response as seen by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when present and numeric.
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Performs a single GET request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `GET url?query` once.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] of kind `Transport` or `Timeout` if no
    /// response could be obtained.
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<RawResponse, FetchError>;
}

/// [`HttpTransport`] backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("entsoe-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Strips the URL (which carries the token) from transport errors.
fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    let kind = if e.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Transport
    };
    FetchError::new(kind, e.without_url().to_string())
}

/// Parses a `Retry-After` value given in (possibly fractional) seconds.
///
/// HTTP-date values are not supported and yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

/// Retry budget for a single logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Longest single wait, also applied to a server's `Retry-After`.
    pub max_backoff: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(45),
        }
    }
}

enum Verdict {
    Accept,
    Retry(String),
    Reject(FetchError),
}

fn classify(response: &RawResponse) -> Verdict {
    let status = response.status;

    if (200..300).contains(&status) {
        if response.body.trim().is_empty() {
            return Verdict::Retry(format!("HTTP {status} with empty body"));
        }
        return Verdict::Accept;
    }

    if RETRYABLE_STATUSES.contains(&status) {
        return Verdict::Retry(format!("HTTP {status}"));
    }

    let detail = reason_summary(&response.body)
        .unwrap_or_else(|| response.body.trim().chars().take(BODY_PREVIEW_LEN).collect());
    Verdict::Reject(FetchError::new(FetchErrorKind::Status(status), detail))
}

/// Downloads documents with bounded retries.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: SecretString,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        token: SecretString,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            token,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetches the document described by `params`.
    ///
    /// The access token is appended here and never appears in logs or
    /// error details.
    ///
    /// # Errors
    ///
    /// * `Status` for a non-retryable HTTP status (with the platform's
    ///   reason when the body carries one)
    /// * `RetriesExhausted` once every attempt failed transiently
    /// * `Cancelled` if `cancel` fires while waiting
    pub async fn fetch(
        &self,
        params: &[(String, String)],
        cancel: &Cancellation,
    ) -> Result<String, FetchError> {
        let label = describe(params);
        let cancelled = || FetchError::new(FetchErrorKind::Cancelled, label.clone());

        let mut query = params.to_vec();
        query.push((TOKEN_PARAM.to_string(), self.token.expose_secret().to_string()));

        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                result = tokio::time::timeout(
                    self.policy.attempt_timeout,
                    self.transport.get(&self.base_url, &query),
                ) => result,
            };

            let retry_after = match outcome {
                Err(_) => {
                    last_failure = format!("no response within {:?}", self.policy.attempt_timeout);
                    None
                }
                Ok(Err(e)) if e.is_transient() => {
                    last_failure = e.to_string();
                    None
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(response)) => match classify(&response) {
                    Verdict::Accept => {
                        log::debug!("{label}: fetched {} bytes", response.body.len());
                        return Ok(response.body);
                    }
                    Verdict::Retry(reason) => {
                        last_failure = reason;
                        response.retry_after
                    }
                    Verdict::Reject(e) => {
                        log::debug!("{label}: {e}");
                        return Err(e);
                    }
                },
            };

            if attempt == max_attempts {
                break;
            }

            let delay = retry_after.map_or(backoff, |d| d.min(self.policy.max_backoff));
            log::warn!(
                "{label}: attempt {attempt}/{max_attempts} failed ({last_failure}), retrying in {delay:?}"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = tokio::time::sleep(delay) => {}
            }

            backoff = (backoff * 2).min(self.policy.max_backoff);
        }

        Err(FetchError::new(
            FetchErrorKind::RetriesExhausted,
            format!("{label}: gave up after {max_attempts} attempts ({last_failure})"),
        ))
    }
}

/// Renders request parameters for logs, e.g. `documentType=A44 in_Domain=...`.
fn describe(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::cancel::cancellation;

    enum Step {
        Respond(RawResponse),
        Fail(FetchError),
        Hang,
    }

    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
        last_query: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
                last_query: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            _url: &str,
            query: &[(String, String)],
        ) -> Result<RawResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = query.to_vec();
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Respond(r)) => Ok(r),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) | None => std::future::pending().await,
            }
        }
    }

    fn status(code: u16, body: &str) -> Step {
        Step::Respond(RawResponse {
            status: code,
            retry_after: None,
            body: body.to_string(),
        })
    }

    fn ok(body: &str) -> Step {
        status(200, body)
    }

    fn fetcher(transport: Arc<ScriptedTransport>) -> ResilientFetcher {
        ResilientFetcher::new(transport, "http://test", SecretString::from("t0ken".to_string()))
    }

    fn params() -> Vec<(String, String)> {
        vec![("documentType".to_string(), "A44".to_string())]
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_three_times_then_success() {
        let transport = ScriptedTransport::new(vec![
            status(429, ""),
            status(429, ""),
            status(429, ""),
            ok("<doc/>"),
        ]);
        let started = Instant::now();

        let body = fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(body, "<doc/>");
        assert_eq!(transport.calls(), 4);
        // 1s + 2s + 4s
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_single_wait() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(RawResponse {
                status: 503,
                retry_after: Some(Duration::from_secs(5)),
                body: String::new(),
            }),
            status(503, ""),
            ok("<doc/>"),
        ]);
        let started = Instant::now();

        fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 3);
        // 5s from the header, then the doubled backoff of 2s
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_capped_at_max_backoff() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(RawResponse {
                status: 429,
                retry_after: Some(Duration::from_secs(3600)),
                body: String::new(),
            }),
            ok("<doc/>"),
        ]);
        let started = Instant::now();

        fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(started.elapsed().as_secs(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        let transport = ScriptedTransport::new((0..8).map(|_| status(500, "")).collect());
        let policy = RetryPolicy {
            max_attempts: 8,
            ..RetryPolicy::default()
        };
        let started = Instant::now();

        let err = fetcher(transport.clone())
            .with_policy(policy)
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::RetriesExhausted);
        assert_eq!(transport.calls(), 8);
        // 1 + 2 + 4 + 8 + 16 + 30 + 30, no sleep after the last attempt
        assert_eq!(started.elapsed().as_secs(), 91);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_success_body_is_retried() {
        let transport = ScriptedTransport::new(vec![ok("  \n"), ok("<doc/>")]);

        let body = fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(body, "<doc/>");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn client_error_is_terminal_and_carries_reason() {
        let body = r"<Acknowledgement_MarketDocument><Reason><code>999</code><text>Invalid domain</text></Reason></Acknowledgement_MarketDocument>";
        let transport = ScriptedTransport::new(vec![status(400, body), ok("<doc/>")]);

        let err = fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::Status(400));
        assert_eq!(err.detail, "999: Invalid domain");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Step::Fail(FetchError::new(FetchErrorKind::Transport, "reset")),
            ok("<doc/>"),
        ]);

        let body = fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(body, "<doc/>");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempts_time_out() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::Hang]);
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let started = Instant::now();

        let err = fetcher(transport.clone())
            .with_policy(policy)
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::RetriesExhausted);
        assert_eq!(transport.calls(), 2);
        assert_eq!(started.elapsed().as_secs(), 45 + 1 + 45);
    }

    #[tokio::test]
    async fn cancelled_job_makes_no_request() {
        let (handle, token) = cancellation();
        handle.cancel();
        let transport = ScriptedTransport::new(vec![ok("<doc/>")]);

        let err = fetcher(transport.clone())
            .fetch(&params(), &token)
            .await
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::Cancelled);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let (handle, token) = cancellation();
        let transport = ScriptedTransport::new(vec![status(429, ""), ok("<doc/>")]);
        let f = fetcher(transport.clone());

        let params = params();

        let (result, ()) = tokio::join!(f.fetch(&params, &token), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        });

        assert_eq!(result.unwrap_err().kind, FetchErrorKind::Cancelled);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn token_is_sent_but_not_logged() {
        let transport = ScriptedTransport::new(vec![status(401, "unauthorized")]);

        let err = fetcher(transport.clone())
            .fetch(&params(), &Cancellation::never())
            .await
            .unwrap_err();

        let query = transport.last_query.lock().unwrap().clone();
        assert!(query.contains(&("securityToken".to_string(), "t0ken".to_string())));
        assert!(!err.to_string().contains("t0ken"));
        assert_eq!(err.detail, "unauthorized");
    }

    #[test]
    fn parses_numeric_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-3"), None);
    }
}
