//! Where agent definitions come from.

use std::path::{Path, PathBuf};

use crate::{AgentConfig, ConfigError, Result};

/// Extension used for agent definition files.
pub const AGENT_FILE_EXTENSION: &str = "yml";

/// Resolves an agent name to its serialized definition.
pub trait AgentSource: Send + Sync {
    /// Load the definition for `name`.
    fn load_agent(&self, name: &str) -> Result<AgentConfig>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Loads `<root>/<name>.yml`.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    root: PathBuf,
    ignore_unknown_keys: bool,
}

impl AgentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_unknown_keys: false,
        }
    }

    /// Drop unrecognized top-level keys instead of failing.
    pub fn with_ignore_unknown_keys(mut self, ignore: bool) -> Self {
        self.ignore_unknown_keys = ignore;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the definition for `name` is expected at.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, AGENT_FILE_EXTENSION))
    }
}

impl AgentSource for AgentDirectory {
    fn load_agent(&self, name: &str) -> Result<AgentConfig> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(ConfigError::AgentNotFound {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        }
        tracing::debug!(agent = %name, path = %path.display(), "Loading agent definition");
        AgentConfig::from_file(&path, self.ignore_unknown_keys)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
