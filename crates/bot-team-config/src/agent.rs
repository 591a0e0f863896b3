//! Serialized agent definitions.
//!
//! An agent file is a YAML mapping:
//!
//! ```yaml
//! system_directives: |
//!   You classify the user's request for %{session_id}.
//! function_call:
//!   name: set_request_type
//! functions:
//!   - name: set_request_type
//!     parameters:
//!       type: object
//!       properties:
//!         request_type:
//!           type: string
//!           enum: ["set test value", "spam"]
//!       required: [request_type]
//! state_map:
//!   function_name: set_request_type
//!   argument_name: request_type
//!   values_map:
//!     "set test value": { agent: leaf }
//!     spam: { ignore: spam }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Keys accepted at the top level of an agent file.
pub const CONFIG_KEYS: &[&str] = &[
    "forward_functions",
    "function_call",
    "functions",
    "max_tokens",
    "model",
    "num_choices",
    "state_map",
    "system_directives",
    "temperature",
];

// ─────────────────────────────────────────────────────────────────────────────
// Agent Config
// ─────────────────────────────────────────────────────────────────────────────

/// The serializable part of an agent definition.
///
/// Request-shaping fields left unset fall back to the runner's
/// [`BotTeamConfig`](crate::BotTeamConfig) when the definition is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_choices: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Prompt template; may contain `%{key}` placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_directives: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDeclaration>,
    /// Declarations appended after `functions` when a request is built.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forward_functions: Vec<FunctionDeclaration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_map: Option<StateMapConfig>,
}

impl AgentConfig {
    /// Parse an agent definition from YAML.
    ///
    /// Top-level keys outside [`CONFIG_KEYS`] are an error unless
    /// `ignore_unknown_keys` is set, in which case they are dropped.
    pub fn from_yaml(yaml: &str, ignore_unknown_keys: bool) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let mut mapping = match value {
            serde_yaml::Value::Mapping(m) => m,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "<root>".to_string(),
                    reason: "agent config must be a mapping".to_string(),
                });
            }
        };

        let unknown: Vec<serde_yaml::Value> = mapping
            .keys()
            .filter(|k| !k.as_str().is_some_and(|k| CONFIG_KEYS.contains(&k)))
            .cloned()
            .collect();

        if let Some(first) = unknown.first() {
            if !ignore_unknown_keys {
                return Err(ConfigError::UnknownKey {
                    key: key_name(first),
                });
            }
            for key in &unknown {
                tracing::debug!(key = %key_name(key), "Ignoring unknown agent config key");
                mapping.remove(key);
            }
        }

        Ok(serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?)
    }

    /// Read and parse an agent definition file.
    pub fn from_file(path: &Path, ignore_unknown_keys: bool) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&contents, ignore_unknown_keys)
    }
}

fn key_name(key: &serde_yaml::Value) -> String {
    match key.as_str() {
        Some(s) => s.to_string(),
        None => format!("{:?}", key),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Declarations
// ─────────────────────────────────────────────────────────────────────────────

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterSchema>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The parameter schema, created empty on first access.
    pub fn parameters_mut(&mut self) -> &mut ParameterSchema {
        self.parameters.get_or_insert_with(ParameterSchema::default)
    }
}

/// JSON-schema-like description of a function's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Mark a parameter as required (idempotent).
    pub fn require(&mut self, name: &str) {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
    }
}

/// Schema for a single parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    /// A plain string parameter.
    pub fn string() -> Self {
        Self {
            property_type: Some("string".to_string()),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Call Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the model may, must not, or must call a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFunctionCall", into = "RawFunctionCall")]
pub enum FunctionCallPolicy {
    #[default]
    Auto,
    None,
    /// The model must call this function.
    Required(String),
}

impl FunctionCallPolicy {
    /// Name of the pinned function, if any.
    pub fn required_name(&self) -> Option<&str> {
        match self {
            Self::Required(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionCallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::None => write!(f, "none"),
            Self::Required(name) => write!(f, "{{name: {}}}", name),
        }
    }
}

/// Accepted spellings: `auto`, `none`, a bare function name, or `{name: ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawFunctionCall {
    Mode(String),
    Named { name: String },
}

impl TryFrom<RawFunctionCall> for FunctionCallPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawFunctionCall) -> Result<Self> {
        let name = match raw {
            RawFunctionCall::Mode(mode) if mode == "auto" => return Ok(Self::Auto),
            RawFunctionCall::Mode(mode) if mode == "none" => return Ok(Self::None),
            RawFunctionCall::Mode(name) | RawFunctionCall::Named { name } => name,
        };
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "function_call".to_string(),
                reason: "function name cannot be empty".to_string(),
            });
        }
        Ok(Self::Required(name))
    }
}

impl From<FunctionCallPolicy> for RawFunctionCall {
    fn from(policy: FunctionCallPolicy) -> Self {
        match policy {
            FunctionCallPolicy::Auto => RawFunctionCall::Mode("auto".to_string()),
            FunctionCallPolicy::None => RawFunctionCall::Mode("none".to_string()),
            FunctionCallPolicy::Required(name) => RawFunctionCall::Named { name },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State Map
// ─────────────────────────────────────────────────────────────────────────────

/// Routes one designated function's discriminant argument to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMapConfig {
    /// The router function.
    pub function_name: String,
    /// The router function's discriminant argument.
    pub argument_name: String,
    /// Discriminant value → action.
    pub values_map: BTreeMap<String, StateAction>,
}

/// Kind of a state-map action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Agent,
    Function,
    Ignore,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Function => "function",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "agent" => Ok(Self::Agent),
            "function" => Ok(Self::Function),
            "ignore" => Ok(Self::Ignore),
            other => Err(ConfigError::InvalidValue {
                field: "state_map.values_map".to_string(),
                reason: format!("Unknown action type {} in state_map", other),
            }),
        }
    }
}

/// What a state-map branch does, written as a single-entry mapping
/// (`{agent: leaf}`, `{function: thanks}`, `{ignore: spam}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub enum StateAction {
    /// Hand the conversation off to another agent.
    Agent(String),
    /// Call a locally registered function.
    Function(String),
    /// Stop without a result; the value is the logged reason.
    Ignore(String),
}

impl StateAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Agent(_) => ActionKind::Agent,
            Self::Function(_) => ActionKind::Function,
            Self::Ignore(_) => ActionKind::Ignore,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Agent(v) | Self::Function(v) | Self::Ignore(v) => v,
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for StateAction {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        let count = map.len();
        let mut entries = map.into_iter();
        let (Some((kind, value)), None) = (entries.next(), entries.next()) else {
            return Err(ConfigError::InvalidValue {
                field: "state_map.values_map".to_string(),
                reason: format!("expected exactly one action, got {}", count),
            });
        };
        Ok(match kind.parse::<ActionKind>()? {
            ActionKind::Agent => Self::Agent(value),
            ActionKind::Function => Self::Function(value),
            ActionKind::Ignore => Self::Ignore(value),
        })
    }
}

impl From<StateAction> for BTreeMap<String, String> {
    fn from(action: StateAction) -> Self {
        let kind = action.kind().as_str().to_string();
        let value = match action {
            StateAction::Agent(v) | StateAction::Function(v) | StateAction::Ignore(v) => v,
        };
        BTreeMap::from([(kind, value)])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
