//! Dispatch core.
//!
//! [`AgentRunner`] owns the agent registry, the runner-level function table,
//! the interpolation set and the usage accumulator. One `run_agent` call is
//! one call chain: each hop awaits a single gateway call and routes the
//! response, handing off to another agent through the state map when asked.
//!
//! ```text
//! run_agent(name, messages)
//!     │
//!     ▼
//! agent_config(name) ─▶ runnable(interpolations) ─▶ build_request
//!     │
//!     ▼
//! Gateway::call ─▶ UsageStats::accumulate ─▶ interpret
//!     │
//!     ├─ Text ──────────────▶ Dispatch::Text
//!     ├─ plain call ────────▶ function ─▶ Dispatch::Output
//!     └─ state function ──▶ agent    ─▶ run_agent(next, hop + 1)
//!                          function ─▶ Dispatch::Output
//!                          ignore   ─▶ Dispatch::Nothing
//! ```

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use bot_team_config::{AgentDirectory, AgentSource, BotTeamConfig, ConfigError, StateAction};
use bot_team_llm::{ChatMessage, ChatRequest, Params, ParsedFunctionCall, SharedGateway};

use crate::cost::{self, PriceLookup};
use crate::definition::AgentDefinition;
use crate::error::{AgentError, Result};
use crate::function::{AgentFunction, FunctionTable, SharedFunction};
use crate::interpreter::{Interpretation, interpret};
use crate::request::build_request;
use crate::types::{Dispatch, Interpolations};
use crate::usage::UsageStats;

/// Runs teams of agents against a gateway.
pub struct AgentRunner {
    gateway: SharedGateway,
    config: BotTeamConfig,
    /// Templates, keyed by agent name. Loaded definitions are cached here.
    agents: HashMap<String, AgentDefinition>,
    source: Option<Arc<dyn AgentSource>>,
    /// Implementations bound into definitions loaded from the source.
    functions: FunctionTable,
    /// Bound for implied functions the table has no entry for.
    fallback: Option<SharedFunction>,
    interpolations: Interpolations,
    usage: UsageStats,
}

impl AgentRunner {
    /// Create a runner. Agents are loaded from `agents_dir` when configured.
    pub fn new(gateway: SharedGateway, config: BotTeamConfig) -> Self {
        let source = config
            .agents_dir
            .as_ref()
            .map(|dir| Arc::new(AgentDirectory::new(dir)) as Arc<dyn AgentSource>);
        Self {
            gateway,
            config,
            agents: HashMap::new(),
            source,
            functions: FunctionTable::new(),
            fallback: None,
            interpolations: Interpolations::new(),
            usage: UsageStats::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn AgentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_interpolations(mut self, interpolations: Interpolations) -> Self {
        self.interpolations = interpolations;
        self
    }

    pub fn config(&self) -> &BotTeamConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a pre-built definition. It takes precedence over the source.
    pub fn add_agent(&mut self, name: impl Into<String>, definition: AgentDefinition) {
        let name = name.into();
        tracing::debug!(agent = %name, "Registered agent");
        let definition = definition.with_name(name.clone());
        self.agents.insert(name, definition);
    }

    /// Register an implementation under its own name.
    pub fn register_function<F>(&mut self, function: F) -> Result<()>
    where
        F: AgentFunction + 'static,
    {
        let name = function
            .name()
            .map(str::to_string)
            .ok_or(AgentError::MissingFunctionName)?;
        self.register_function_as(name, function)
    }

    /// Register an implementation under an explicit name.
    pub fn register_function_as<F>(&mut self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: AgentFunction + 'static,
    {
        self.register_shared_function(name, Arc::new(function))
    }

    pub fn register_shared_function(
        &mut self,
        name: impl Into<String>,
        function: SharedFunction,
    ) -> Result<()> {
        let name = name.into();
        function.signature().validate(&name)?;
        self.functions.register(name, function);
        Ok(())
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Use `function` for any implied function with no registered
    /// implementation, instead of failing with `FunctionNotFound`.
    pub fn set_fallback_function(&mut self, function: SharedFunction) -> Result<()> {
        function.signature().validate("<fallback>")?;
        self.fallback = Some(function);
        Ok(())
    }

    pub fn interpolate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.interpolations.insert(key, value);
    }

    /// Register a value computed only when a dispatch needs it.
    pub fn interpolate_lazy<F>(&mut self, key: impl Into<String>, f: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.interpolations.insert_lazy(key, f);
    }

    pub fn interpolations(&self) -> &Interpolations {
        &self.interpolations
    }

    /// The template registered as `name`, loading and caching it from the
    /// source on first use.
    ///
    /// Loaded definitions get their implied functions bound from the
    /// runner's function table.
    pub fn agent_config(&mut self, name: &str) -> Result<&AgentDefinition> {
        if !self.agents.contains_key(name) {
            let definition = self.load_agent(name)?;
            self.agents.insert(name.to_string(), definition);
        }
        self.agents
            .get(name)
            .ok_or_else(|| AgentError::config(format!("Agent {} vanished from registry", name)))
    }

    fn load_agent(&self, name: &str) -> Result<AgentDefinition> {
        let Some(source) = &self.source else {
            return Err(ConfigError::AgentNotFound {
                name: name.to_string(),
                path: "<no agent source configured>".to_string(),
            }
            .into());
        };

        let mut definition = AgentDefinition::load(source.as_ref(), name, &self.config)?;
        if let Some(fallback) = &self.fallback {
            for function in definition.implied_functions() {
                if !definition.function_procs.contains(&function)
                    && !self.functions.contains(&function)
                {
                    tracing::debug!(
                        agent = %name,
                        function = %function,
                        "Binding fallback implementation"
                    );
                    definition.function_procs.register(function, fallback.clone());
                }
            }
        }
        definition.bind_functions(&self.functions)?;
        tracing::debug!(
            agent = %name,
            source = %source.describe(),
            functions = definition.functions.len(),
            "Loaded agent"
        );
        Ok(definition)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// The request a dispatch of `name` with `messages` would send.
    pub fn create_request(&mut self, name: &str, messages: &[ChatMessage]) -> Result<ChatRequest> {
        let interpolations = self.interpolations.clone();
        let definition = self.agent_config(name)?.runnable(&interpolations);
        Ok(build_request(&definition, messages))
    }

    /// Start a team at `name`.
    pub async fn run_team(&mut self, name: &str, messages: Vec<ChatMessage>) -> Result<Dispatch> {
        self.run_agent(name, messages).await
    }

    /// Dispatch `messages` to the agent registered as `name`.
    pub async fn run_agent(&mut self, name: &str, messages: Vec<ChatMessage>) -> Result<Dispatch> {
        self.dispatch(name.to_string(), messages, 0).await
    }

    fn dispatch(
        &mut self,
        name: String,
        messages: Vec<ChatMessage>,
        hop: u32,
    ) -> BoxFuture<'_, Result<Dispatch>> {
        Box::pin(async move {
            let max_hops = self.config.max_hops();
            if hop > max_hops {
                tracing::warn!(agent = %name, hop, max_hops, "Hand-off limit exceeded");
                return Err(AgentError::HopLimitExceeded {
                    agent: name,
                    max_hops,
                });
            }

            let interpolations = self.interpolations.clone();
            let definition = self.agent_config(&name)?.runnable(&interpolations);
            let request = build_request(&definition, &messages);

            tracing::debug!(
                agent = %name,
                hop,
                model = %request.model,
                messages = request.messages.len(),
                functions = request.functions.len(),
                "Calling gateway"
            );

            let gateway = Arc::clone(&self.gateway);
            let response = gateway.call(&request).await.map_err(|e| {
                tracing::error!(agent = %name, hop, error = %e, "Gateway call failed");
                AgentError::from(e)
            })?;

            self.usage.accumulate(&response);

            match interpret(&response) {
                Interpretation::Text(text) => {
                    tracing::info!(agent = %name, hop, response_len = text.len(), "Agent answered");
                    Ok(Dispatch::Text(text))
                }
                Interpretation::FunctionCalls(calls) => {
                    tracing::info!(
                        agent = %name,
                        hop,
                        calls = %calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
                        "Routing function calls"
                    );
                    self.route_calls(&definition, calls, request.messages, hop)
                        .await
                }
                Interpretation::Empty => Err(AgentError::NoUsableResponse(name)),
            }
        })
    }

    /// Invoke every call in order. A single call yields its own result;
    /// several yield the collected non-empty results.
    async fn route_calls(
        &mut self,
        definition: &AgentDefinition,
        mut calls: Vec<ParsedFunctionCall>,
        history: Vec<ChatMessage>,
        hop: u32,
    ) -> Result<Dispatch> {
        if calls.len() == 1
            && let Some(call) = calls.pop()
        {
            return self.invoke_call(definition, call, history, hop).await;
        }

        let mut outputs = Vec::new();
        for call in calls {
            let result = self
                .invoke_call(definition, call, history.clone(), hop)
                .await?;
            if let Some(value) = result.into_value() {
                outputs.push(value);
            }
        }
        Ok(Dispatch::Outputs(outputs))
    }

    async fn invoke_call(
        &mut self,
        definition: &AgentDefinition,
        call: ParsedFunctionCall,
        history: Vec<ChatMessage>,
        hop: u32,
    ) -> Result<Dispatch> {
        let Some(params) = call.arguments else {
            tracing::warn!(
                agent = %definition.display_name(),
                function = %call.name,
                "Skipping function call with unusable arguments"
            );
            return Ok(Dispatch::Nothing);
        };

        if definition.state_function() == Some(call.name.as_str()) {
            return self.route_state(definition, params, history, hop).await;
        }

        let output = self.invoke_function(definition, &call.name, params).await?;
        Ok(Dispatch::from_output(output))
    }

    /// Follow the state map for a call to the router function.
    async fn route_state(
        &mut self,
        definition: &AgentDefinition,
        params: Params,
        history: Vec<ChatMessage>,
        hop: u32,
    ) -> Result<Dispatch> {
        let agent = definition.display_name().to_string();
        let Some(action) = definition.state_function_action(&params).cloned() else {
            return Err(AgentError::StateMapMiss {
                agent,
                argument: definition
                    .state_function_argument()
                    .unwrap_or_default()
                    .to_string(),
                value: definition
                    .state_function_discriminant(&params)
                    .unwrap_or_default(),
            });
        };
        let stripped = definition
            .state_function_action_params(&params)
            .unwrap_or_default();

        tracing::debug!(
            agent = %agent,
            action = %action.kind(),
            value = %action.value(),
            "ACTION -> {} {}",
            action.kind(),
            action.value()
        );

        match action {
            StateAction::Agent(next) => {
                if let Some(callback) = definition.callbacks.agent.clone() {
                    return callback(next, stripped).await;
                }
                tracing::debug!(
                    "ACTION -> call_agent with {} {} {}",
                    next,
                    text_param(&stripped, "sentiment"),
                    text_param(&stripped, "classification_confidence")
                );
                self.dispatch(next, history, hop + 1).await
            }
            StateAction::Function(function) => {
                let output = self.invoke_function(definition, &function, stripped).await?;
                Ok(Dispatch::from_output(output))
            }
            StateAction::Ignore(reason) => {
                if let Some(callback) = definition.callbacks.ignore.clone() {
                    return callback(reason, stripped).await;
                }
                tracing::debug!(
                    "ACTION -> IGNORE FUNCTION REASON: {} SENTIMENT: {} CONFIDENCE: {}",
                    reason,
                    text_param(&stripped, "sentiment"),
                    text_param(&stripped, "classification_confidence")
                );
                Ok(Dispatch::Nothing)
            }
        }
    }

    /// Call an implementation bound to the definition, falling back to the
    /// runner's function table.
    async fn invoke_function(
        &self,
        definition: &AgentDefinition,
        name: &str,
        params: Params,
    ) -> Result<serde_json::Value> {
        if definition.function_procs.contains(name) {
            definition.function_procs.invoke(name, params).await
        } else if let Some(fallback) = &self.fallback
            && !self.functions.contains(name)
        {
            tracing::debug!(function = %name, "Invoking fallback implementation");
            fallback.call(params).await
        } else {
            self.functions.invoke(name, params).await
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Usage
    // ─────────────────────────────────────────────────────────────────────────

    pub fn usage_stats(&self) -> &UsageStats {
        &self.usage
    }

    /// USD cost of everything dispatched through this runner.
    pub fn total_cost(&self, prices: &dyn PriceLookup) -> Result<f64> {
        Ok(cost::total_cost(&self.usage, prices)?)
    }
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut agents: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        agents.sort_unstable();
        f.debug_struct("AgentRunner")
            .field("gateway", &self.gateway.name())
            .field("agents", &agents)
            .field("functions", &self.functions)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

fn text_param(params: &Params, key: &str) -> String {
    match params.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::PriceTable;
    use crate::definition::FunctionOptions;
    use crate::function::{FnFunction, Signature};
    use crate::types::Callbacks;
    use bot_team_config::{FunctionDeclaration, StateMapConfig};
    use bot_team_llm::{ChatResponse, MockGateway, ToolCall, Usage};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn usage_response(response: ChatResponse, prompt: u64, completion: u64) -> ChatResponse {
        response
            .with_model("gpt-5")
            .with_service_tier("default")
            .with_usage(Usage::new(prompt, completion))
    }

    fn switchboard(config: &BotTeamConfig) -> AgentDefinition {
        let mut values_map = BTreeMap::new();
        values_map.insert(
            "set test value".to_string(),
            StateAction::Agent("leaf".to_string()),
        );
        values_map.insert("spam".to_string(), StateAction::Ignore("spam".to_string()));
        values_map.insert(
            "thanks".to_string(),
            StateAction::Function("say_thanks".to_string()),
        );

        let mut definition = AgentDefinition::new(config);
        definition.system_directives = Some("Classify the request.".to_string());
        definition.functions = vec![FunctionDeclaration::new("set_request_type")];
        definition.state_map = Some(StateMapConfig {
            function_name: "set_request_type".to_string(),
            argument_name: "request_type".to_string(),
            values_map,
        });
        definition
    }

    fn leaf(config: &BotTeamConfig) -> AgentDefinition {
        let mut definition = AgentDefinition::new(config);
        definition.system_directives = Some("Set the value.".to_string());
        definition
            .add_function(
                FnFunction::sync(
                    "set_test_value",
                    Signature::new().required("value"),
                    |_| Ok(json!("OUTPUT FROM THE LEAF FUNCTION")),
                ),
                FunctionOptions::default().required(),
            )
            .unwrap();
        definition
    }

    fn runner(gateway: Arc<MockGateway>) -> AgentRunner {
        let config = BotTeamConfig::new();
        let mut runner = AgentRunner::new(gateway, config.clone());
        runner.add_agent("switchboard", switchboard(&config));
        runner.add_agent("leaf", leaf(&config));
        runner
    }

    #[tokio::test]
    async fn test_text_response() {
        let gateway = Arc::new(MockGateway::with_text("Hello there"));
        let mut runner = runner(gateway.clone());

        let result = runner
            .run_agent("leaf", vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(result, Dispatch::Text("Hello there".to_string()));
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn test_switchboard_hands_off_to_leaf() {
        let gateway = Arc::new(MockGateway::new(vec![
            usage_response(
                ChatResponse::calling(
                    "set_request_type",
                    r#"{"request_type": "set test value", "sentiment": "neutral"}"#,
                ),
                100,
                10,
            ),
            usage_response(ChatResponse::calling("set_test_value", r#"{"value": "99"}"#), 50, 5),
        ]));
        let mut runner = runner(gateway.clone());
        let history = vec![ChatMessage::user("set test value to 99")];

        let result = runner.run_team("switchboard", history).await.unwrap();
        assert_eq!(result.as_text(), Some("OUTPUT FROM THE LEAF FUNCTION"));

        let requests = gateway.requests();
        assert_eq!(requests.len(), 2);
        let user_messages = |r: &ChatRequest| {
            r.messages
                .iter()
                .filter(|m| m.role == bot_team_llm::Role::User)
                .map(|m| m.text().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(user_messages(&requests[0]), user_messages(&requests[1]));
        assert_eq!(requests[1].messages[0].text(), Some("Set the value."));
        assert_eq!(
            requests[1].to_json()["tool_choice"],
            json!({"type": "function", "function": {"name": "set_test_value"}})
        );
    }

    #[tokio::test]
    async fn test_only_first_choice_is_routed() {
        let mut first = ChatResponse::calling(
            "set_request_type",
            r#"{"request_type": "set test value"}"#,
        );
        let second = ChatResponse::calling("set_request_type", r#"{"request_type": "thanks"}"#);
        first.choices.extend(second.choices.into_iter().map(|mut c| {
            c.index = 1;
            c
        }));
        let gateway = Arc::new(MockGateway::new(vec![
            usage_response(first, 100, 10),
            usage_response(ChatResponse::calling("set_test_value", r#"{"value": "1"}"#), 50, 5),
        ]));
        let mut runner = runner(gateway.clone());

        let result = runner
            .run_agent("switchboard", vec![ChatMessage::user("go")])
            .await
            .unwrap();
        assert_eq!(result.as_text(), Some("OUTPUT FROM THE LEAF FUNCTION"));
        assert_eq!(gateway.request_count(), 2);
        assert_eq!(runner.usage_stats().get("gpt-5", "default").unwrap().total, 165);
    }

    #[tokio::test]
    async fn test_two_hop_usage_is_summed() {
        let gateway = Arc::new(MockGateway::new(vec![
            usage_response(
                ChatResponse::calling("set_request_type", r#"{"request_type": "set test value"}"#),
                100,
                10,
            ),
            usage_response(ChatResponse::calling("set_test_value", r#"{"value": "1"}"#), 50, 5),
        ]));
        let mut runner = runner(gateway);
        runner
            .run_agent("switchboard", vec![ChatMessage::user("go")])
            .await
            .unwrap();

        let counts = runner.usage_stats().get("gpt-5", "default").unwrap();
        assert_eq!(counts.input, 150);
        assert_eq!(counts.output, 15);
        assert_eq!(counts.total, 165);
    }

    #[tokio::test]
    async fn test_ignore_returns_nothing() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::calling(
            "set_request_type",
            r#"{"request_type": "spam", "sentiment": "annoyed", "classification_confidence": 0.9}"#,
        )]));
        let mut runner = runner(gateway.clone());

        let result = runner
            .run_agent("switchboard", vec![ChatMessage::user("buy now")])
            .await
            .unwrap();
        assert!(result.is_nothing());
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn test_function_action_gets_stripped_params() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::calling(
            "set_request_type",
            r#"{"request_type": "thanks", "sentiment": "happy"}"#,
        )]));
        let mut runner = runner(gateway);
        runner
            .register_function(FnFunction::sync(
                "say_thanks",
                Signature::new().optional("sentiment"),
                |params| {
                    assert!(!params.contains_key("request_type"));
                    Ok(json!(format!("you're welcome ({})", params["sentiment"].as_str().unwrap_or(""))))
                },
            ))
            .unwrap();

        let result = runner
            .run_agent("switchboard", vec![ChatMessage::user("thank you")])
            .await
            .unwrap();
        assert_eq!(result.as_text(), Some("you're welcome (happy)"));
    }

    #[tokio::test]
    async fn test_state_map_miss_is_an_error() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::calling(
            "set_request_type",
            r#"{"request_type": "weather"}"#,
        )]));
        let mut runner = runner(gateway);

        let err = runner
            .run_agent("switchboard", vec![ChatMessage::user("rain?")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::StateMapMiss { ref value, .. } if value == "weather"
        ));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_skipped() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::calling(
            "set_request_type",
            "{not json",
        )]));
        let mut runner = runner(gateway);

        let result = runner
            .run_agent("switchboard", vec![ChatMessage::user("?")])
            .await
            .unwrap();
        assert!(result.is_nothing());
    }

    #[tokio::test]
    async fn test_multiple_calls_collect_outputs() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::calling_all(vec![
            ToolCall::new("a", "double", r#"{"n": 2}"#),
            ToolCall::new("b", "double", "{broken"),
            ToolCall::new("c", "double", r#"{"n": 5}"#),
        ])]));
        let config = BotTeamConfig::new();
        let mut runner = AgentRunner::new(gateway, config.clone());
        let mut math = AgentDefinition::new(&config);
        math.add_function(
            FnFunction::sync("double", Signature::new().required("n"), |params| {
                Ok(json!(params["n"].as_i64().unwrap_or(0) * 2))
            }),
            FunctionOptions::default(),
        )
        .unwrap();
        runner.add_agent("math", math);

        let result = runner
            .run_agent("math", vec![ChatMessage::user("double 2 and 5")])
            .await
            .unwrap();
        assert_eq!(result, Dispatch::Outputs(vec![json!(4), json!(10)]));
    }

    #[tokio::test]
    async fn test_empty_response_is_no_usable_response() {
        let gateway = Arc::new(MockGateway::new(vec![ChatResponse::text("")]));
        let mut runner = runner(gateway);

        let err = runner
            .run_agent("leaf", vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No useful response from agent leaf");
    }

    #[tokio::test]
    async fn test_gateway_error_propagates() {
        let gateway = Arc::new(MockGateway::with_results(vec![Err(
            bot_team_llm::GatewayError::Auth("bad key".to_string()),
        )]));
        let mut runner = runner(gateway);

        let err = runner
            .run_agent("leaf", vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
        assert!(runner.usage_stats().is_empty());
    }

    #[tokio::test]
    async fn test_hop_limit() {
        let mut values_map = BTreeMap::new();
        values_map.insert("again".to_string(), StateAction::Agent("loop".to_string()));
        let mut config = BotTeamConfig::new();
        config.max_hops = Some(2);

        let mut looping = AgentDefinition::new(&config);
        looping.functions = vec![FunctionDeclaration::new("route")];
        looping.state_map = Some(StateMapConfig {
            function_name: "route".to_string(),
            argument_name: "next".to_string(),
            values_map,
        });

        let responses = (0..5)
            .map(|_| ChatResponse::calling("route", r#"{"next": "again"}"#))
            .collect();
        let gateway = Arc::new(MockGateway::new(responses));
        let mut runner = AgentRunner::new(gateway.clone(), config);
        runner.add_agent("loop", looping);

        let err = runner
            .run_agent("loop", vec![ChatMessage::user("spin")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::HopLimitExceeded { ref agent, max_hops: 2 } if agent == "loop"
        ));
        assert_eq!(gateway.request_count(), 3);
    }

    #[tokio::test]
    async fn test_callbacks_replace_builtin_actions() {
        let gateway = Arc::new(MockGateway::new(vec![
            ChatResponse::calling("set_request_type", r#"{"request_type": "set test value"}"#),
            ChatResponse::calling("set_request_type", r#"{"request_type": "spam", "sentiment": "rude"}"#),
        ]));
        let config = BotTeamConfig::new();
        let callbacks = Callbacks::default()
            .on_agent(|next, _params| async move { Ok(Dispatch::Text(format!("would call {}", next))) })
            .on_ignore(|reason, params| async move {
                Ok(Dispatch::Output(json!({
                    "ignored": reason,
                    "sentiment": params.get("sentiment").cloned(),
                })))
            });
        let mut runner = AgentRunner::new(gateway.clone(), config.clone());
        runner.add_agent("switchboard", switchboard(&config).with_callbacks(callbacks));

        let first = runner
            .run_agent("switchboard", vec![ChatMessage::user("one")])
            .await
            .unwrap();
        assert_eq!(first.as_text(), Some("would call leaf"));

        let second = runner
            .run_agent("switchboard", vec![ChatMessage::user("two")])
            .await
            .unwrap();
        assert_eq!(
            second,
            Dispatch::Output(json!({"ignored": "spam", "sentiment": "rude"}))
        );
        assert_eq!(gateway.request_count(), 2);
    }

    #[tokio::test]
    async fn test_lazy_interpolation_evaluated_per_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let gateway = Arc::new(MockGateway::new(vec![
            ChatResponse::text("one"),
            ChatResponse::text("two"),
        ]));
        let config = BotTeamConfig::new();
        let mut runner = AgentRunner::new(gateway.clone(), config.clone());
        let mut helper = AgentDefinition::new(&config);
        helper.system_directives = Some("Items: %{items}. Again: %{items}".to_string());
        runner.add_agent("helper", helper);
        runner.interpolate_lazy("items", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "apples, pears".to_string()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        runner.run_agent("helper", vec![ChatMessage::user("a")]).await.unwrap();
        runner.run_agent("helper", vec![ChatMessage::user("b")]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let requests = gateway.requests();
        assert_eq!(
            requests[0].messages[0].text(),
            Some("Items: apples, pears. Again: apples, pears")
        );
    }

    #[test]
    fn test_unknown_agent_without_source() {
        let gateway = Arc::new(MockGateway::new(vec![]));
        let mut runner = AgentRunner::new(gateway, BotTeamConfig::new());
        let err = runner.agent_config("ghost").unwrap_err();
        assert!(err.to_string().starts_with("No config found for agent ghost"));
    }

    #[test]
    fn test_agents_load_from_directory_and_bind_functions() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("helper.yml"),
            "model: gpt-4o-mini\nfunctions:\n  - name: lookup\n",
        )
        .unwrap();

        let mut config = BotTeamConfig::new();
        config.agents_dir = Some(dir.path().to_path_buf());
        let gateway = Arc::new(MockGateway::new(vec![]));
        let mut runner = AgentRunner::new(gateway, config);

        let err = runner.agent_config("helper").unwrap_err();
        assert!(matches!(err, AgentError::FunctionNotFound(ref n) if n == "lookup"));

        runner
            .register_function(FnFunction::sync("lookup", Signature::new(), |_| Ok(json!(1))))
            .unwrap();
        let definition = runner.agent_config("helper").unwrap();
        assert_eq!(definition.model, "gpt-4o-mini");
        assert_eq!(definition.name.as_deref(), Some("helper"));
        assert!(definition.function_procs.contains("lookup"));

        let err = runner.agent_config("missing").unwrap_err();
        assert!(matches!(
            err,
            AgentError::AgentConfig(ConfigError::AgentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_function_answers_unregistered_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("helper.yml"),
            "model: gpt-4o-mini\nfunctions:\n  - name: lookup\n  - name: known\n",
        )
        .unwrap();

        let mut config = BotTeamConfig::new();
        config.agents_dir = Some(dir.path().to_path_buf());
        let gateway = Arc::new(MockGateway::new(vec![
            ChatResponse::calling("lookup", r#"{"id": "7"}"#),
            ChatResponse::calling("known", "{}"),
        ]));
        let mut runner = AgentRunner::new(gateway, config);
        runner
            .register_function(FnFunction::sync("known", Signature::new(), |_| {
                Ok(json!("registered"))
            }))
            .unwrap();
        runner
            .set_fallback_function(Arc::new(FnFunction::anonymous(
                Signature::new().keyword_rest("arguments"),
                |params| async move { Ok(serde_json::Value::Object(params)) },
            )))
            .unwrap();

        let result = runner
            .run_agent("helper", vec![ChatMessage::user("find 7")])
            .await
            .unwrap();
        assert_eq!(result, Dispatch::Output(json!({"id": "7"})));

        let result = runner
            .run_agent("helper", vec![ChatMessage::user("again")])
            .await
            .unwrap();
        assert_eq!(result.as_text(), Some("registered"));
    }

    #[test]
    fn test_fallback_function_rejects_positional_parameters() {
        let gateway = Arc::new(MockGateway::new(vec![]));
        let mut runner = AgentRunner::new(gateway, BotTeamConfig::new());
        let err = runner
            .set_fallback_function(Arc::new(FnFunction::sync(
                "bad",
                Signature::new().positional("x"),
                |_| Ok(json!(null)),
            )))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidSignature { .. }));
    }

    #[test]
    fn test_create_request_interpolates() {
        let gateway = Arc::new(MockGateway::new(vec![]));
        let config = BotTeamConfig::new();
        let mut runner = AgentRunner::new(gateway, config.clone());
        let mut helper = AgentDefinition::new(&config);
        helper.system_directives = Some("Hello %{name}".to_string());
        runner.add_agent("helper", helper);
        runner.interpolate("name", "Ada");

        let request = runner
            .create_request("helper", &[ChatMessage::user("hi")])
            .unwrap();
        assert_eq!(request.messages[0].text(), Some("Hello Ada"));
        assert_eq!(
            runner.agent_config("helper").unwrap().system_directives.as_deref(),
            Some("Hello %{name}")
        );
    }

    #[tokio::test]
    async fn test_total_cost() {
        let gateway = Arc::new(MockGateway::new(vec![usage_response(
            ChatResponse::text("ok"),
            1_000_000,
            100_000,
        )]));
        let mut runner = runner(gateway);
        let prices = PriceTable::from_csv_str(
            "tier,model,input,input_cached,output\nstandard,gpt-5,1.25,0.125,10.00\n",
        )
        .unwrap();

        assert_eq!(runner.total_cost(&prices).unwrap(), 0.0);
        runner.run_agent("leaf", vec![ChatMessage::user("hi")]).await.unwrap();
        let cost = runner.total_cost(&prices).unwrap();
        assert!((cost - 2.25).abs() < 1e-9, "cost was {cost}");
    }
}
