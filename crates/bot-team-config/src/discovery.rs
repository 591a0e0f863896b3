//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/bot-team/config.toml` (XDG user config)
//! 2. `./bot-team.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{BotTeamConfig, ConfigError, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "bot-team.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "bot-team";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "BOT_TEAM_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: BotTeamConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// The files a layered load reads, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// `config.toml` in the user config directory, when one resolves.
    pub user: Option<PathBuf>,
    /// `bot-team.toml` in the project directory.
    pub project: PathBuf,
}

impl ConfigPaths {
    /// Resolve the user file via [`xdg_config_path`] and the project file
    /// under `project_dir` (or the working directory).
    pub fn discover(project_dir: Option<&Path>) -> Self {
        Self {
            user: xdg_config_path(),
            project: project_dir.unwrap_or(Path::new(".")).join(PROJECT_CONFIG_FILE),
        }
    }

    fn layers(&self) -> impl Iterator<Item = &Path> {
        self.user
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.project.as_path()))
    }

    /// Merge every layer that exists; broken layers become warnings.
    pub fn load(&self) -> LoadedConfig {
        let mut loaded = LoadedConfig {
            config: BotTeamConfig::new(),
            sources: Vec::new(),
            warnings: Vec::new(),
        };
        for path in self.layers() {
            let source = load_layer(&mut loaded.config, path, &mut loaded.warnings);
            loaded.sources.push(source);
        }

        if loaded.config.has_plaintext_api_key() {
            loaded.warnings.push(
                "[api] contains a plaintext API key; prefer the OPENAI_API_KEY environment variable"
                    .to_string(),
            );
        }
        loaded
    }
}

/// Discover and merge the user and project config layers.
pub fn load_config(project_dir: Option<&Path>) -> LoadedConfig {
    ConfigPaths::discover(project_dir).load()
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<BotTeamConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    BotTeamConfig::from_toml(&contents)
}

/// Get the XDG config file path for bot-team.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for bot-team.
///
/// Checks `BOT_TEAM_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped; an unreadable or malformed one becomes a warning.
fn load_layer(config: &mut BotTeamConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            tracing::debug!(path = %path.display(), "Loaded config layer");
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
