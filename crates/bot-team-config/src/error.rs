//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading runner configuration or agent definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to parse YAML.
    #[error("failed to parse YAML config: {0}")]
    ParseYaml(String),

    /// An agent definition contained a key that is not part of the schema.
    #[error("Unknown key {key} in config")]
    UnknownKey { key: String },

    /// No definition file exists for the requested agent.
    #[error("No config found for agent {name} at {path}")]
    AgentNotFound { name: String, path: String },

    /// Both an inline config and a config path were supplied.
    #[error("config_path and config cannot both be provided")]
    ConflictingSources,

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A value was present but not acceptable.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseYaml(err.to_string())
    }
}
