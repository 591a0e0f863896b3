//! Error types for the agent crate.

use thiserror::Error;

use crate::cost::PricingError;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent definition and dispatch.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent configuration could not be loaded or parsed.
    #[error(transparent)]
    AgentConfig(#[from] bot_team_config::ConfigError),

    /// A function implementation declares a parameter shape that cannot be
    /// expressed as a tool schema.
    #[error(
        "Invalid parameter '{parameter}' on function {function}: positional arguments, \
         variadics, and blocks are not allowed in tool functions, use named parameters only"
    )]
    InvalidSignature { function: String, parameter: String },

    /// A second function was marked required while another is pinned.
    #[error("Cannot set required function {requested} when function_call is already set to {current}")]
    FunctionCallConflict { requested: String, current: String },

    /// Neither an explicit nor an inferable function name was available.
    #[error("No name provided for function")]
    MissingFunctionName,

    /// No declaration or implementation exists under this name.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// A required parameter was absent when invoking a function.
    #[error("Missing required parameter '{parameter}' for function {function}")]
    MissingParameter { function: String, parameter: String },

    /// The router function selected a value with no state-map entry.
    #[error("No state_map entry in agent {agent} for {argument} = {value}")]
    StateMapMiss {
        agent: String,
        argument: String,
        value: String,
    },

    /// Agent hand-offs exceeded the configured maximum.
    #[error("Agent hand-off limit of {max_hops} exceeded at agent {agent}")]
    HopLimitExceeded { agent: String, max_hops: u32 },

    /// Provider call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] bot_team_llm::GatewayError),

    /// The response carried neither text nor a function call.
    #[error("No useful response from agent {0}")]
    NoUsableResponse(String),

    /// Cost could not be computed.
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// A caller-supplied function or callback failed.
    #[error("Function {function} failed: {message}")]
    Function { function: String, message: String },
}

impl AgentError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a function failure.
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors caused by agent or function configuration
    /// rather than the provider or pricing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::AgentConfig(_)
                | Self::InvalidSignature { .. }
                | Self::FunctionCallConflict { .. }
                | Self::MissingFunctionName
                | Self::FunctionNotFound(_)
                | Self::StateMapMiss { .. }
                | Self::HopLimitExceeded { .. }
        )
    }
}
