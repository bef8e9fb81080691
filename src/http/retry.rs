//! Bounded retry loop driven by the error classifier.

use log::debug;
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::classify::{ErrorKind, classify};
use super::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::config::RetryPolicy;

/// Unsanitized description of a failed request. Stays on the diagnostics
/// side; callers of the API only ever see the safe message derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The transport produced no response.
    Transport(TransportError),
    /// A response arrived outside the 2xx range.
    Status { status: u16, status_text: String },
    /// A 2xx body could not be decoded.
    Decode(String),
    /// The request could not be built from the caller's input.
    Invalid(String),
    /// The caller gave up before the request finished.
    Cancelled,
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Failure::Transport(e) => classify(Some(e), None),
            Failure::Status { status, .. } => classify(None, Some(*status)),
            Failure::Decode(_) | Failure::Invalid(_) | Failure::Cancelled => ErrorKind::Default,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transport(e) => write!(f, "{}", e),
            Failure::Status {
                status,
                status_text,
            } => write!(f, "HTTP {} {}", status, status_text),
            Failure::Decode(msg) => write!(f, "Failed to parse JSON response: {}", msg),
            Failure::Invalid(msg) => write!(f, "Invalid request: {}", msg),
            Failure::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for Failure {}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        Failure::Transport(error)
    }
}

/// Sends `request` until it succeeds, fails with a non-retryable kind, or
/// the policy runs out of retries.
///
/// `attempt` is zero-based; the wait after attempt `n` is
/// [`RetryPolicy::delay_for`]`(n)`. At most `max_retries + 1` requests are
/// issued. `cancel` is checked before every request and raced against every
/// wait.
///
/// Attempt logs carry the URL and status and are emitted at `debug` only.
#[tracing::instrument(skip(transport, request, policy, cancel), fields(method = %request.method))]
pub async fn execute_with_retry<T>(
    transport: &T,
    request: &ApiRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ApiResponse, Failure>
where
    T: Transport + ?Sized,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("{} {}: cancelled before attempt {}", request.method, request.url, attempt + 1);
            return Err(Failure::Cancelled);
        }

        let failure = match transport.send(request.clone()).await {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => Failure::Status {
                status: response.status,
                status_text: response.status_text,
            },
            Err(e) => Failure::Transport(e),
        };

        let kind = failure.kind();
        if !kind.is_retryable() {
            debug!(
                "{} {}: non-retryable {} failure: {}",
                request.method, request.url, kind, failure
            );
            return Err(failure);
        }

        if attempt >= policy.max_retries() {
            debug!(
                "{} {}: giving up after {} attempts ({})",
                request.method,
                request.url,
                attempt + 1,
                failure
            );
            return Err(failure);
        }

        let delay = policy.delay_for(attempt);
        debug!(
            "{} {}: attempt {}/{} failed ({}), retrying in {}ms...",
            request.method,
            request.url,
            attempt + 1,
            policy.max_attempts(),
            failure,
            delay.as_millis()
        );

        if cancel.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!("{} {}: cancelled while waiting to retry", request.method, request.url);
                return Err(Failure::Cancelled);
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    const URL: &str = "http://api.local/contactos";

    /// Mock transport that answers attempt `n` with `script(n)` and records
    /// when each attempt happened.
    fn scripted<F>(script: F) -> (MockTransport, Arc<Mutex<Vec<Instant>>>)
    where
        F: Fn(usize) -> Result<ApiResponse, TransportError> + Send + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = Arc::clone(&calls);
        let mut transport = MockTransport::new();
        transport.expect_send().returning(move |_| {
            let mut calls = calls_clone.lock().unwrap();
            calls.push(Instant::now());
            script(calls.len() - 1)
        });
        (transport, calls)
    }

    fn waits(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let (transport, calls) = scripted(|_| Ok(ApiResponse::new(200, "[]")));

        let response = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_server_error_exhausts_retries() {
        let (transport, calls) = scripted(|_| Ok(ApiResponse::new(503, "")));
        let policy = RetryPolicy::default();

        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            Failure::Status {
                status: 503,
                status_text: "Service Unavailable".to_string()
            }
        );
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), policy.max_attempts());
        assert_eq!(
            waits(&calls),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let (transport, calls) = scripted(|_| Ok(ApiResponse::new(404, "")));

        let result = execute_with_retry(
            &transport,
            &ApiRequest::delete(format!("{}/42", URL)),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Client);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_transport_error_is_not_retried() {
        let (transport, calls) = scripted(|_| Err(TransportError::Other("weird".to_string())));

        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Default);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_connect_failures() {
        let (transport, calls) = scripted(|attempt| {
            if attempt < 2 {
                Err(TransportError::Connect("connection refused".to_string()))
            } else {
                Ok(ApiResponse::new(201, r#"{"id":"9"}"#))
            }
        });

        let response = execute_with_retry(
            &transport,
            &ApiRequest::post_json(URL, serde_json::json!({"nombre": "Ana"})),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 201);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            waits(&calls),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_clamp_past_table() {
        let (transport, calls) =
            scripted(|_| Err(TransportError::Timeout("deadline elapsed".to_string())));
        let policy = RetryPolicy::new(4, vec![100, 200]).unwrap();

        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            waits(&calls),
            [100, 200, 200, 200].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let (transport, calls) = scripted(|_| Ok(ApiResponse::new(500, "")));
        let policy = RetryPolicy::new(0, vec![500]).unwrap();

        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &RetryPolicy::default(),
            &cancel,
        )
        .await;

        assert_eq!(result.unwrap_err(), Failure::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let mut transport = MockTransport::new();
        transport.expect_send().returning(move |_| {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse::new(502, ""))
        });

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = execute_with_retry(
            &transport,
            &ApiRequest::get(URL),
            &RetryPolicy::default(),
            &cancel,
        )
        .await;

        assert_eq!(result.unwrap_err(), Failure::Cancelled);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            Failure::from(TransportError::Connect("refused".to_string())).kind(),
            ErrorKind::Network
        );
        assert_eq!(Failure::Decode("eof".to_string()).kind(), ErrorKind::Default);
        assert_eq!(Failure::Cancelled.kind(), ErrorKind::Default);
        assert_eq!(Failure::Invalid("..".to_string()).kind(), ErrorKind::Default);
        assert_eq!(
            Failure::Status {
                status: 500,
                status_text: String::new()
            }
            .status(),
            Some(500)
        );
    }
}
