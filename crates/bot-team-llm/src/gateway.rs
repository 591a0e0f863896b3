//! Gateway trait and mock implementation.
//!
//! A gateway performs one provider round trip: it sends a [`ChatRequest`] and
//! returns the parsed [`ChatResponse`] or an error. Retrying transient
//! failures is the gateway's business; callers treat every error as final.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{GatewayError, Result, is_retryable};
use crate::types::{ChatRequest, ChatResponse, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits).
/// Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    gateway_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) || attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    gateway = gateway_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A connection to a chat completion provider.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a request and return the parsed response.
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Get the name of this gateway.
    fn name(&self) -> &str;
}

/// A gateway that can be shared across threads.
pub type SharedGateway = Arc<dyn Gateway>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// A mock gateway for testing purposes.
///
/// Returns pre-configured responses in order and records every request it
/// receives.
#[derive(Debug)]
pub struct MockGateway {
    name: String,
    responses: Mutex<Vec<Result<ChatResponse>>>,
    request_log: Mutex<Vec<ChatRequest>>,
}

impl MockGateway {
    /// Create a new mock gateway with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock gateway that may also fail on chosen calls.
    pub fn with_results(results: Vec<Result<ChatResponse>>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(results),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock gateway with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![
            ChatResponse::text(text)
                .with_model("mock-model")
                .with_service_tier("default")
                .with_usage(Usage::new(10, 20)),
        ])
    }

    /// Get all requests that were made to this gateway.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.request_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().map(|log| log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.request_log
            .lock()
            .map_err(|_| GatewayError::Internal("MockGateway: request log poisoned".to_string()))?
            .push(request.clone());

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| GatewayError::Internal("MockGateway: responses poisoned".to_string()))?;
        if responses.is_empty() {
            return Err(GatewayError::Backend(
                "MockGateway: no more responses available".to_string(),
            ));
        }
        responses.remove(0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bot_team_config::BotTeamConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(text: &str) -> ChatRequest {
        let mut req = ChatRequest::new(&BotTeamConfig::new());
        req.add_user_message(text);
        req
    }

    #[tokio::test]
    async fn test_mock_gateway_single_response() {
        let gateway = MockGateway::with_text("Hello!");

        let response = gateway.call(&request("Hi")).await.unwrap();

        assert_eq!(response.message(), Some("Hello!"));
        assert_eq!(gateway.request_count(), 1);
        assert_eq!(gateway.requests()[0].messages[0].text(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_mock_gateway_multiple_responses() {
        let gateway = MockGateway::new(vec![
            ChatResponse::text("First"),
            ChatResponse::calling("lookup", "{}"),
        ]);

        let r1 = gateway.call(&request("1")).await.unwrap();
        let r2 = gateway.call(&request("2")).await.unwrap();

        assert_eq!(r1.message(), Some("First"));
        assert_eq!(r2.function_call().unwrap().name, "lookup");
        assert_eq!(gateway.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_gateway_exhausted() {
        let gateway = MockGateway::new(vec![]);
        let result = gateway.call(&request("Hi")).await;
        assert!(matches!(result, Err(GatewayError::Backend(_))));
    }

    #[tokio::test]
    async fn test_mock_gateway_scripted_failure() {
        let gateway = MockGateway::with_results(vec![Err(GatewayError::NoResponse)]);
        let result = gateway.call(&request("Hi")).await;
        assert!(matches!(result, Err(GatewayError::NoResponse)));
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::Network("reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::RateLimit("busy".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::RateLimit(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(5, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::Auth("bad key".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
