//! Chat completion request and response types.
//!
//! These follow the OpenAI chat completions wire format. Function
//! declarations and the function-call policy are shared with agent
//! configuration so a declaration read from YAML is sent unchanged.

use bot_team_config::{BotTeamConfig, FunctionCallPolicy, FunctionDeclaration};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Text content; absent on assistant messages that only call functions.
    #[serde(default)]
    pub content: Option<String>,
    /// Function calls requested by the assistant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call this message answers (role `tool` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// A function call as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// Name and raw JSON argument string of a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Resolve the raw argument string into a parameter map.
    pub fn parse(&self) -> ParsedFunctionCall {
        ParsedFunctionCall {
            id: self.id.clone(),
            name: self.function.name.clone(),
            arguments: parse_function_arguments(&self.function.name, &self.function.arguments),
        }
    }
}

/// Parameter bag passed to function implementations.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A function call with its arguments decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFunctionCall {
    pub id: String,
    pub name: String,
    /// `None` when the model produced malformed or non-object JSON.
    pub arguments: Option<Params>,
}

/// Decode a function call's JSON argument string.
///
/// Malformed JSON and non-object values are logged and yield `None`.
pub fn parse_function_arguments(function: &str, raw: &str) -> Option<Params> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(other) => {
            tracing::error!(
                function = %function,
                arguments = %other,
                "Function arguments are not a JSON object"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                function = %function,
                arguments = %raw,
                error = %e,
                "Failed to parse function arguments"
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Request
// ─────────────────────────────────────────────────────────────────────────────

/// A chat completion request.
///
/// Built fresh for every dispatch. Serializes to the provider payload via
/// [`ChatRequest::to_wire`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    /// Number of choices to generate (`n` on the wire).
    pub num_choices: u32,
    pub temperature: f32,
    /// Callable functions, in the order they are offered.
    pub functions: Vec<FunctionDeclaration>,
    /// Unset means "auto when functions exist, otherwise none".
    pub function_call: Option<FunctionCallPolicy>,
}

impl ChatRequest {
    /// Create an empty request using the configured defaults.
    pub fn new(config: &BotTeamConfig) -> Self {
        Self {
            model: config.model().to_string(),
            messages: Vec::new(),
            max_tokens: config.max_tokens(),
            num_choices: config.num_choices(),
            temperature: config.temperature(),
            functions: Vec::new(),
            function_call: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_functions(mut self, functions: Vec<FunctionDeclaration>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_function_call(mut self, policy: FunctionCallPolicy) -> Self {
        self.function_call = Some(policy);
        self
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(Role::User, content);
    }

    pub fn add_agent_message(&mut self, content: impl Into<String>) {
        self.add_message(Role::Assistant, content);
    }

    /// Add a system message, optionally just before the last user message.
    ///
    /// Falls back to appending when there is no user message.
    pub fn add_system_message(&mut self, content: impl Into<String>, before_last_user: bool) {
        let message = ChatMessage::system(content);
        let position = before_last_user
            .then(|| self.messages.iter().rposition(|m| m.role == Role::User))
            .flatten();
        match position {
            Some(index) => self.messages.insert(index, message),
            None => self.messages.push(message),
        }
    }

    /// Remove every system message and insert `content` before the last user message.
    pub fn replace_system_directives(&mut self, content: impl Into<String>) {
        self.messages.retain(|m| m.role != Role::System);
        self.add_system_message(content, true);
    }

    /// Extend the last system message with a new line of `content`, or add one.
    pub fn append_system_directives(&mut self, content: impl Into<String>) {
        let content = content.into();
        match self.messages.iter_mut().rev().find(|m| m.role == Role::System) {
            Some(message) => {
                let existing = message.content.take().unwrap_or_default();
                message.content = Some(format!("{}\n{}", existing, content));
            }
            None => self.messages.push(ChatMessage::system(content)),
        }
    }

    /// The `tool_choice` value that will be sent.
    pub fn resolved_function_call(&self) -> FunctionCallPolicy {
        match &self.function_call {
            Some(policy) => policy.clone(),
            None if self.functions.is_empty() => FunctionCallPolicy::None,
            None => FunctionCallPolicy::Auto,
        }
    }

    /// The provider payload.
    pub fn to_wire(&self) -> WireRequest<'_> {
        let (tools, tool_choice) = if self.functions.is_empty() {
            (None, None)
        } else {
            let tools = self
                .functions
                .iter()
                .map(|function| WireTool {
                    tool_type: "function",
                    function,
                })
                .collect();
            let choice = match self.resolved_function_call() {
                FunctionCallPolicy::Auto => WireToolChoice::Mode("auto"),
                FunctionCallPolicy::None => WireToolChoice::Mode("none"),
                FunctionCallPolicy::Required(name) => WireToolChoice::Function {
                    choice_type: "function",
                    function: WireFunctionName { name },
                },
            };
            (Some(tools), Some(choice))
        };

        WireRequest {
            model: &self.model,
            messages: &self.messages,
            max_tokens: self.max_tokens,
            n: self.num_choices,
            temperature: self.temperature,
            tools,
            tool_choice,
        }
    }

    /// The provider payload as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.to_wire()).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ChatRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Borrowed view of a request in provider wire format.
#[derive(Debug, Serialize)]
pub struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    n: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<WireToolChoice>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a FunctionDeclaration,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireToolChoice {
    Mode(&'static str),
    Function {
        #[serde(rename = "type")]
        choice_type: &'static str,
        function: WireFunctionName,
    },
}

#[derive(Debug, Serialize)]
struct WireFunctionName {
    name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Response
// ─────────────────────────────────────────────────────────────────────────────

/// A chat completion response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
    /// Processing tier reported by the provider (`default`, `flex`, ...).
    #[serde(default)]
    pub service_tier: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            prompt_tokens_details: None,
        }
    }

    pub fn with_cached_tokens(mut self, cached_tokens: u64) -> Self {
        self.prompt_tokens_details = Some(PromptTokensDetails { cached_tokens });
        self
    }

    /// Prompt tokens served from cache.
    pub fn cached_tokens(&self) -> u64 {
        self.prompt_tokens_details
            .map(|d| d.cached_tokens)
            .unwrap_or(0)
    }
}

impl ChatResponse {
    /// A single-choice response carrying text.
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_message(ChatMessage::assistant(content))
    }

    /// A single-choice response calling one function.
    pub fn calling(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::calling_all(vec![ToolCall::new("call_0", name, arguments)])
    }

    /// A single-choice response calling several functions.
    pub fn calling_all(calls: Vec<ToolCall>) -> Self {
        Self::from_message(ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: calls,
            tool_call_id: None,
        })
    }

    fn from_message(message: ChatMessage) -> Self {
        let finish_reason = if message.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };
        Self {
            object: "chat.completion".to_string(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: Some(finish_reason.to_string()),
            }],
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_service_tier(mut self, tier: impl Into<String>) -> Self {
        self.service_tier = Some(tier.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Text content of the first choice.
    pub fn message(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.text())
    }

    /// Whether the first choice requests any function call.
    pub fn has_function_call(&self) -> bool {
        self.choices
            .first()
            .is_some_and(|c| !c.message.tool_calls.is_empty())
    }

    /// The first function call of the first choice.
    pub fn function_call(&self) -> Option<ParsedFunctionCall> {
        self.choices
            .first()
            .and_then(|c| c.message.tool_calls.first())
            .map(ToolCall::parse)
    }

    /// Every function call across every choice, in order.
    ///
    /// Arguments are decoded independently; one malformed call does not
    /// affect the others.
    pub fn function_calls(&self) -> Vec<ParsedFunctionCall> {
        self.choices
            .iter()
            .flat_map(|c| c.message.tool_calls.iter())
            .map(ToolCall::parse)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
