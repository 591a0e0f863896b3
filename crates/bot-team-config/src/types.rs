//! Runner configuration mapping to the TOML schema.
//!
//! ```toml
//! model = "gpt-4o-mini"
//! max_tokens = 200
//! temperature = 0.2
//! agents_dir = "config/agents"
//!
//! [api]
//! url = "https://api.openai.com/v1/chat/completions"
//! request_timeout_secs = 45
//! ```
//!
//! Every field is optional so that partial layers (user config, project-local
//! overrides) can be merged. Accessors fall back to the library defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chat completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 80;
pub const DEFAULT_NUM_CHOICES: u32 = 1;
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2000;

/// Maximum number of agent hand-offs in one call chain.
pub const DEFAULT_MAX_HOPS: u32 = 16;

pub const DEFAULT_LOG_LEVEL: &str = "info";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration for a runner.
///
/// Passed explicitly into the runner and threaded into every agent definition
/// built from configuration; there is no process-wide mutable default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotTeamConfig {
    /// Default model for agents that don't set one.
    pub model: Option<String>,
    /// Default completion token limit.
    pub max_tokens: Option<u32>,
    /// Default number of choices requested.
    pub num_choices: Option<u32>,
    /// Default sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum agent hand-offs before a call chain is aborted.
    pub max_hops: Option<u32>,
    /// Directory holding `<agent>.yml` definitions.
    pub agents_dir: Option<PathBuf>,
    /// CSV price table used for cost reporting.
    pub pricing_file: Option<PathBuf>,
    /// Default log filter for the CLI.
    pub log_level: Option<String>,
    /// Provider connection settings.
    pub api: Option<ApiConfig>,
}

/// Provider connection settings (`[api]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Chat completions endpoint.
    pub url: Option<String>,
    /// API key. Prefer the environment variable over storing it here.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout_secs: Option<u64>,
    /// Retries for timeouts, connection failures and rate limits.
    pub max_retries: Option<u32>,
    /// Delay before the first retry; doubles on every attempt.
    pub retry_backoff_ms: Option<u64>,
}

impl BotTeamConfig {
    /// Create an empty config (all library defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::ConfigError::Other(e.to_string()))
    }

    /// Merge another layer on top of this one (other takes priority).
    pub fn merge(&mut self, other: BotTeamConfig) {
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.num_choices.is_some() {
            self.num_choices = other.num_choices;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.max_hops.is_some() {
            self.max_hops = other.max_hops;
        }
        if other.agents_dir.is_some() {
            self.agents_dir = other.agents_dir;
        }
        if other.pricing_file.is_some() {
            self.pricing_file = other.pricing_file;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if let Some(layer) = other.api {
            match self.api.as_mut() {
                Some(base) => base.merge(layer),
                None => self.api = Some(layer),
            }
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn num_choices(&self) -> u32 {
        self.num_choices.unwrap_or(DEFAULT_NUM_CHOICES)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops.unwrap_or(DEFAULT_MAX_HOPS)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn api_url(&self) -> &str {
        self.api
            .as_ref()
            .and_then(|a| a.url.as_deref())
            .unwrap_or(DEFAULT_API_URL)
    }

    /// Resolve the API key: config file first, then `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.api
            .as_ref()
            .and_then(|a| a.api_key.clone())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.api
                .as_ref()
                .and_then(|a| a.request_timeout_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.api
            .as_ref()
            .and_then(|a| a.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(
            self.api
                .as_ref()
                .and_then(|a| a.retry_backoff_ms)
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        )
    }

    /// Whether an API key is stored in plaintext in the config itself.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api.as_ref().is_some_and(|a| a.api_key.is_some())
    }
}

impl ApiConfig {
    fn merge(&mut self, other: ApiConfig) {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.retry_backoff_ms.is_some() {
            self.retry_backoff_ms = other.retry_backoff_ms;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotTeamConfig::new();
        assert_eq!(config.model(), "gpt-3.5-turbo");
        assert_eq!(config.max_tokens(), 80);
        assert_eq!(config.num_choices(), 1);
        assert_eq!(config.temperature(), 0.9);
        assert_eq!(config.max_hops(), DEFAULT_MAX_HOPS);
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_parse_toml() {
        let config = BotTeamConfig::from_toml(
            r#"
            model = "gpt-4o-mini"
            max_tokens = 200
            agents_dir = "config/agents"

            [api]
            request_timeout_secs = 45
            max_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.max_tokens(), 200);
        assert_eq!(config.agents_dir, Some(PathBuf::from("config/agents")));
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
        assert_eq!(config.max_retries(), 1);
        // Untouched fields keep defaults
        assert_eq!(config.temperature(), 0.9);
    }

    #[test]
    fn test_to_toml_skips_unset_fields() {
        let mut config = BotTeamConfig::new();
        config.model = Some("gpt-5".to_string());
        config.max_hops = Some(4);

        let text = config.to_toml().unwrap();
        assert!(text.contains("model = \"gpt-5\""));
        assert!(!text.contains("temperature"));
        assert_eq!(BotTeamConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let result = BotTeamConfig::from_toml("max_tokens = \"lots\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_layers() {
        let mut base = BotTeamConfig::from_toml(
            r#"
            model = "base-model"
            temperature = 0.5
            [api]
            url = "http://base"
            max_retries = 5
            "#,
        )
        .unwrap();
        let layer = BotTeamConfig::from_toml(
            r#"
            model = "override-model"
            [api]
            url = "http://override"
            "#,
        )
        .unwrap();

        base.merge(layer);

        assert_eq!(base.model(), "override-model");
        assert_eq!(base.temperature(), 0.5);
        assert_eq!(base.api_url(), "http://override");
        assert_eq!(base.max_retries(), 5);
    }

    #[test]
    fn test_plaintext_api_key_detection() {
        let config = BotTeamConfig::from_toml("[api]\napi_key = \"sk-test\"").unwrap();
        assert!(config.has_plaintext_api_key());
        assert_eq!(config.api_key(), Some("sk-test".to_string()));
        assert!(!BotTeamConfig::new().has_plaintext_api_key());
    }
}
