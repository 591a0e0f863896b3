//! CLI command handlers.

pub mod config;
pub mod request;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::Args;

use bot_team_agent::{AgentRunner, FnFunction, Interpolations, Signature};
use bot_team_config::{BotTeamConfig, ConfigSource, LoadedConfig};
use bot_team_llm::{ChatMessage, SharedGateway};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: BotTeamConfig,
    /// Config files checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load an explicit config file, or discover the layered config.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    match path {
        Some(path) => {
            let config = bot_team_config::load_config_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok(LoadedConfig {
                config,
                sources: vec![ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                }],
                warnings: Vec::new(),
            })
        }
        None => Ok(bot_team_config::load_config(None)),
    }
}

/// Arguments shared by commands that dispatch to an agent.
#[derive(Args, Debug, Clone)]
pub struct TeamArgs {
    /// Agent to start at
    #[arg(short, long)]
    pub agent: String,

    /// Directory containing `<agent>.yml` definitions
    #[arg(long, env = "BOT_TEAM_AGENTS_DIR")]
    pub agents_dir: Option<PathBuf>,

    /// Prompt substitution as key=value (repeatable)
    #[arg(short = 'i', long = "interpolate", value_parser = parse_interpolation)]
    pub interpolations: Vec<(String, String)>,

    /// User message
    pub message: String,
}

impl TeamArgs {
    /// Config with command-line overrides applied.
    pub fn config(&self, ctx: &Context) -> Result<BotTeamConfig> {
        let mut config = ctx.config.clone();
        if let Some(dir) = &self.agents_dir {
            config.agents_dir = Some(dir.clone());
        }
        if config.agents_dir.is_none() {
            bail!("No agents directory: pass --agents-dir or set agents_dir in config");
        }
        Ok(config)
    }

    /// A runner for this invocation.
    ///
    /// The CLI has no function implementations of its own, so every plain
    /// function an agent declares is answered by [`echo_function`].
    pub fn runner(&self, gateway: SharedGateway, config: BotTeamConfig) -> Result<AgentRunner> {
        let mut interpolations = Interpolations::new();
        for (key, value) in &self.interpolations {
            interpolations.insert(key.clone(), value.clone());
        }
        let mut runner = AgentRunner::new(gateway, config).with_interpolations(interpolations);
        runner.set_fallback_function(Arc::new(echo_function()))?;
        Ok(runner)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::user(self.message.clone())]
    }
}

/// Logs the call and returns its arguments unchanged.
pub fn echo_function() -> FnFunction {
    FnFunction::anonymous(Signature::new().keyword_rest("arguments"), |params| async move {
        tracing::info!(arguments = %serde_json::Value::Object(params.clone()), "Function called");
        Ok(serde_json::Value::Object(params))
    })
}

/// Parse `key=value`.
pub fn parse_interpolation(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
