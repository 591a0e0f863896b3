//! Agent definitions.
//!
//! An [`AgentDefinition`] is a reusable template: model parameters, a system
//! prompt with `%{key}` placeholders, declared functions with their
//! implementations, and an optional state map that turns one function into a
//! router. Dispatch never runs a template directly; it runs the copy returned
//! by [`AgentDefinition::runnable`].

use std::path::PathBuf;
use std::sync::Arc;

use bot_team_config::{
    ActionKind, AgentConfig, AgentSource, BotTeamConfig, ConfigError, FunctionCallPolicy,
    FunctionDeclaration, ParameterSchema, PropertySchema, StateAction, StateMapConfig,
};
use bot_team_llm::Params;

use crate::error::{AgentError, Result};
use crate::function::{AgentFunction, FunctionTable, ParamKind, SharedFunction};
use crate::types::{Callbacks, Interpolations};

/// Type given to parameters derived from a signature.
const DEFAULT_PARAMETER_TYPE: &str = "string";

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Options for [`AgentDefinition::add_function`].
#[derive(Debug, Clone, Default)]
pub struct FunctionOptions {
    /// Overrides the implementation's own name.
    pub name: Option<String>,
    pub description: Option<String>,
    /// Pin `function_call` to this function.
    pub required: bool,
}

impl FunctionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Schema refinements for [`AgentDefinition::define_parameter`].
///
/// Unset fields leave the existing schema untouched.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpec {
    pub param_type: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub enum_values: Option<Vec<String>>,
}

impl ParameterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = Some(param_type.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent Definition
// ─────────────────────────────────────────────────────────────────────────────

/// A named bundle of model parameters, prompt and callable functions.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Registry key, when registered or loaded by name.
    pub name: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub num_choices: u32,
    pub temperature: f32,
    /// Prompt template with `%{key}` placeholders.
    pub system_directives: Option<String>,
    pub functions: Vec<FunctionDeclaration>,
    /// Appended after `functions` when a request is built.
    pub forward_functions: Vec<FunctionDeclaration>,
    pub function_call: Option<FunctionCallPolicy>,
    /// Implementations, keyed by function name.
    pub function_procs: FunctionTable,
    pub state_map: Option<StateMapConfig>,
    pub callbacks: Callbacks,
}

impl AgentDefinition {
    /// An empty definition using the runner defaults.
    pub fn new(defaults: &BotTeamConfig) -> Self {
        Self {
            name: None,
            model: defaults.model().to_string(),
            max_tokens: defaults.max_tokens(),
            num_choices: defaults.num_choices(),
            temperature: defaults.temperature(),
            system_directives: None,
            functions: Vec::new(),
            forward_functions: Vec::new(),
            function_call: None,
            function_procs: FunctionTable::new(),
            state_map: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Build from a serialized definition; unset fields take the runner defaults.
    pub fn from_config(config: AgentConfig, defaults: &BotTeamConfig) -> Self {
        Self {
            name: None,
            model: config
                .model
                .unwrap_or_else(|| defaults.model().to_string()),
            max_tokens: config.max_tokens.unwrap_or_else(|| defaults.max_tokens()),
            num_choices: config.num_choices.unwrap_or_else(|| defaults.num_choices()),
            temperature: config.temperature.unwrap_or_else(|| defaults.temperature()),
            system_directives: config.system_directives,
            functions: config.functions,
            forward_functions: config.forward_functions,
            function_call: config.function_call,
            function_procs: FunctionTable::new(),
            state_map: config.state_map,
            callbacks: Callbacks::default(),
        }
    }

    /// Load the definition registered as `name` in `source`.
    pub fn load(source: &dyn AgentSource, name: &str, defaults: &BotTeamConfig) -> Result<Self> {
        let config = source.load_agent(name)?;
        Ok(Self::from_config(config, defaults).with_name(name))
    }

    pub fn builder() -> AgentDefinitionBuilder {
        AgentDefinitionBuilder::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Name for logs and errors.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Functions
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a callable function.
    ///
    /// The name comes from `options.name`, else from the implementation. The
    /// parameter schema is derived from the implementation's signature:
    /// required parameters become required strings, optional ones optional
    /// strings, keyword-rest parameters are omitted.
    pub fn add_function<F>(&mut self, function: F, options: FunctionOptions) -> Result<()>
    where
        F: AgentFunction + 'static,
    {
        self.add_shared_function(Arc::new(function), options)
    }

    pub fn add_shared_function(
        &mut self,
        function: SharedFunction,
        options: FunctionOptions,
    ) -> Result<()> {
        let name = options
            .name
            .or_else(|| function.name().map(str::to_string))
            .filter(|n| !n.trim().is_empty())
            .ok_or(AgentError::MissingFunctionName)?;

        let signature = function.signature();
        signature.validate(&name)?;

        if options.required {
            if let Some(FunctionCallPolicy::Required(current)) = &self.function_call
                && current != &name
            {
                return Err(AgentError::FunctionCallConflict {
                    requested: name,
                    current: current.clone(),
                });
            }
            self.function_call = Some(FunctionCallPolicy::Required(name.clone()));
        }

        let mut parameters = ParameterSchema::default();
        for param in signature.params() {
            match param.kind {
                ParamKind::Required => {
                    parameters
                        .properties
                        .insert(param.name.clone(), default_property());
                    parameters.require(&param.name);
                }
                ParamKind::Optional => {
                    parameters
                        .properties
                        .insert(param.name.clone(), default_property());
                }
                _ => {}
            }
        }

        let declaration = FunctionDeclaration {
            name: name.clone(),
            description: options.description,
            parameters: Some(parameters),
        };
        match self.functions.iter_mut().find(|f| f.name == name) {
            Some(existing) => *existing = declaration,
            None => self.functions.push(declaration),
        }

        tracing::debug!(agent = %self.display_name(), function = %name, "Added function");
        self.function_procs.register(name, function);
        Ok(())
    }

    /// Refine the schema of one parameter of a declared function.
    pub fn define_parameter(
        &mut self,
        function_name: &str,
        param_name: &str,
        spec: ParameterSpec,
    ) -> Result<()> {
        let declaration = self
            .functions
            .iter_mut()
            .find(|f| f.name == function_name)
            .ok_or_else(|| AgentError::FunctionNotFound(function_name.to_string()))?;

        let parameters = declaration.parameters_mut();
        let property = parameters
            .properties
            .entry(param_name.to_string())
            .or_insert_with(default_property);

        if let Some(param_type) = spec.param_type {
            property.property_type = Some(param_type);
        }
        if let Some(description) = spec.description {
            property.description = Some(description);
        }
        if let Some(values) = spec.enum_values {
            property.enum_values = Some(values);
        }
        match spec.required {
            Some(true) => parameters.require(param_name),
            Some(false) => parameters.required.retain(|r| r != param_name),
            None => {}
        }
        Ok(())
    }

    /// Functions that need an implementation from outside the definition:
    /// declared functions other than the router, plus `function` actions
    /// referenced by the state map.
    pub fn implied_functions(&self) -> Vec<String> {
        let state_function = self.state_function();
        let mut names: Vec<String> = self
            .functions
            .iter()
            .map(|f| f.name.clone())
            .filter(|n| Some(n.as_str()) != state_function)
            .collect();

        if let Some(state_map) = &self.state_map {
            for action in state_map.values_map.values() {
                if let StateAction::Function(name) = action
                    && !names.contains(name)
                {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Fill `function_procs` for every implied function from `table`.
    ///
    /// Implementations already present are kept.
    pub fn bind_functions(&mut self, table: &FunctionTable) -> Result<()> {
        for name in self.implied_functions() {
            if self.function_procs.contains(&name) {
                continue;
            }
            let function = table
                .get(&name)
                .ok_or_else(|| AgentError::FunctionNotFound(name.clone()))?;
            self.function_procs.register(name, function);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State Map
    // ─────────────────────────────────────────────────────────────────────────

    /// The router function's name.
    pub fn state_function(&self) -> Option<&str> {
        self.state_map.as_ref().map(|s| s.function_name.as_str())
    }

    /// The router function's discriminant argument.
    pub fn state_function_argument(&self) -> Option<&str> {
        self.state_map.as_ref().map(|s| s.argument_name.as_str())
    }

    /// The discriminant value found in `params`, as text.
    pub fn state_function_discriminant(&self, params: &Params) -> Option<String> {
        let argument = self.state_function_argument()?;
        params.get(argument).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// The action selected by `params`.
    pub fn state_function_action(&self, params: &Params) -> Option<&StateAction> {
        let value = self.state_function_discriminant(params)?;
        self.state_map.as_ref()?.values_map.get(&value)
    }

    pub fn state_function_action_type(&self, params: &Params) -> Option<ActionKind> {
        self.state_function_action(params).map(StateAction::kind)
    }

    pub fn state_function_action_value(&self, params: &Params) -> Option<&str> {
        self.state_function_action(params).map(StateAction::value)
    }

    /// `params` without the discriminant argument.
    pub fn state_function_action_params(&self, params: &Params) -> Option<Params> {
        let argument = self.state_function_argument()?;
        let mut stripped = params.clone();
        stripped.remove(argument);
        Some(stripped)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Interpolation
    // ─────────────────────────────────────────────────────────────────────────

    /// An independent copy with `%{key}` placeholders in the system
    /// directives substituted. The template itself is untouched.
    pub fn runnable(&self, interpolations: &Interpolations) -> Self {
        let mut copy = self.clone();
        if let Some(template) = &self.system_directives {
            copy.system_directives = Some(interpolations.apply(template));
        }
        copy
    }
}

fn default_property() -> PropertySchema {
    PropertySchema {
        property_type: Some(DEFAULT_PARAMETER_TYPE.to_string()),
        ..Default::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a definition from exactly one of an inline config or a config file.
#[derive(Debug, Default)]
pub struct AgentDefinitionBuilder {
    name: Option<String>,
    config: Option<AgentConfig>,
    config_path: Option<PathBuf>,
    defaults: BotTeamConfig,
    ignore_unknown_keys: bool,
    callbacks: Callbacks,
}

impl AgentDefinitionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn defaults(mut self, defaults: BotTeamConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn ignore_unknown_keys(mut self, ignore: bool) -> Self {
        self.ignore_unknown_keys = ignore;
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn build(self) -> Result<AgentDefinition> {
        let config = match (self.config, self.config_path) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSources.into()),
            (Some(config), None) => config,
            (None, Some(path)) => AgentConfig::from_file(&path, self.ignore_unknown_keys)?,
            (None, None) => AgentConfig::default(),
        };

        let mut definition =
            AgentDefinition::from_config(config, &self.defaults).with_callbacks(self.callbacks);
        definition.name = self.name;
        Ok(definition)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
