//! Configuration for bot-team.
//!
//! Two layers live here:
//! - Runner defaults ([`BotTeamConfig`]) loaded from TOML, layered as XDG
//!   user config then project-local `bot-team.toml`
//! - Agent definitions ([`AgentConfig`]) loaded from `<agents_dir>/<name>.yml`
//!   through an [`AgentSource`]

pub mod agent;
pub mod discovery;
pub mod error;
pub mod source;
pub mod types;

pub use agent::{
    ActionKind, AgentConfig, CONFIG_KEYS, FunctionCallPolicy, FunctionDeclaration,
    ParameterSchema, PropertySchema, StateAction, StateMapConfig,
};
pub use discovery::{
    ConfigPaths, ConfigSource, LoadedConfig, load_config, load_config_file,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use source::{AGENT_FILE_EXTENSION, AgentDirectory, AgentSource};
pub use types::*;
