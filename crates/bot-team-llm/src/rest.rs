//! REST gateway for OpenAI-compatible chat completion endpoints.

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use std::time::Duration;

use bot_team_config::{
    BotTeamConfig, DEFAULT_API_URL, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RETRY_BACKOFF_MS,
};

use crate::error::{GatewayError, Result};
use crate::gateway::{Gateway, with_retry};
use crate::types::{ChatRequest, ChatResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for [`RestGateway`].
#[derive(Debug, Clone)]
pub struct RestGatewayConfig {
    /// Full chat completions URL.
    pub url: String,

    /// Bearer token (optional for local servers).
    pub api_key: Option<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,

    /// Name for this gateway instance.
    pub name: String,
}

impl Default for RestGatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            name: "openai".to_string(),
        }
    }
}

impl RestGatewayConfig {
    /// Build from runner configuration.
    ///
    /// Fails when no API key is configured or present in the environment.
    pub fn from_config(config: &BotTeamConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            GatewayError::Config(format!(
                "{} environment variable not set",
                bot_team_config::API_KEY_ENV
            ))
        })?;

        Ok(Self {
            url: config.api_url().to_string(),
            api_key: Some(api_key),
            timeout: config.request_timeout(),
            max_retries: config.max_retries(),
            retry_backoff: config.retry_backoff(),
            ..Default::default()
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// REST Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Posts chat requests to an OpenAI-compatible endpoint.
pub struct RestGateway {
    client: Client,
    config: RestGatewayConfig,
}

impl RestGateway {
    pub fn new(config: RestGatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_config(config: &BotTeamConfig) -> Result<Self> {
        Self::new(RestGatewayConfig::from_config(config)?)
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        match &self.config.api_key {
            Some(api_key) => builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key)),
            None => builder,
        }
    }

    async fn handle_response(response: Response) -> Result<ChatResponse> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(GatewayError::NoResponse);
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn handle_error_response(response: Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => match status.as_u16() {
                401 => GatewayError::Auth(format!("Authentication failed: {}", error.error.message)),
                429 => GatewayError::RateLimit(error.error.message),
                500..=599 => GatewayError::Backend(format!("Server error: {}", error.error.message)),
                _ => GatewayError::Backend(error.error.message),
            },
            Err(_) => match status.as_u16() {
                401 => GatewayError::Auth(format!("HTTP {}: {}", status, body)),
                429 => GatewayError::RateLimit(format!("HTTP {}: {}", status, body)),
                _ => GatewayError::Backend(format!("HTTP {}: {}", status, body)),
            },
        }
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(
            gateway = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            functions = request.functions.len(),
            "Sending chat request"
        );

        let payload = request.to_wire();

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .add_headers(self.client.post(&self.config.url))
                    .json(&payload)
                    .send()
                    .await?;

                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
