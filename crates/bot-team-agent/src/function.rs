//! Callable function implementations and their registry.
//!
//! A function offered to the model is a named implementation taking a
//! parameter bag (`serde_json::Map`) and returning a JSON value. Its
//! [`Signature`] lists the named parameters it accepts; the agent
//! definition derives the tool schema from it.
//!
//! # Example
//!
//! ```rust,ignore
//! let lookup = FnFunction::new(
//!     "lookup_order",
//!     Signature::new().required("order_id").optional("region"),
//!     |params| async move {
//!         let id = params["order_id"].as_str().unwrap_or_default().to_string();
//!         Ok(serde_json::json!({ "order": id, "status": "shipped" }))
//!     },
//! );
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bot_team_llm::Params;

use crate::error::{AgentError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Signatures
// ─────────────────────────────────────────────────────────────────────────────

/// How a parameter is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Named, must be supplied.
    Required,
    /// Named, may be omitted.
    Optional,
    /// Catch-all for extra named parameters. Not part of the schema.
    KeywordRest,
    /// Positional. Not representable as a tool parameter.
    Positional,
    /// Variadic positional. Not representable as a tool parameter.
    Variadic,
    /// Callback/block. Not representable as a tool parameter.
    Block,
}

impl ParamKind {
    /// Whether this kind can appear on a tool function.
    pub fn is_representable(&self) -> bool {
        matches!(self, Self::Required | Self::Optional | Self::KeywordRest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

/// Declared parameters of a function implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn required(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::Required)
    }

    pub fn optional(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::Optional)
    }

    pub fn keyword_rest(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::KeywordRest)
    }

    pub fn positional(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::Positional)
    }

    pub fn variadic(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::Variadic)
    }

    pub fn block(self, name: impl Into<String>) -> Self {
        self.with(name, ParamKind::Block)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Names of the parameters that must be supplied.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::Required)
            .map(|p| p.name.as_str())
    }

    /// Reject positional, variadic and block parameters.
    pub fn validate(&self, function: &str) -> Result<()> {
        match self.params.iter().find(|p| !p.kind.is_representable()) {
            Some(param) => Err(AgentError::InvalidSignature {
                function: function.to_string(),
                parameter: param.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Trait
// ─────────────────────────────────────────────────────────────────────────────

/// An implementation the model can call.
#[async_trait]
pub trait AgentFunction: Send + Sync {
    /// The implementation's own identifier, used when no name is given at
    /// registration.
    fn name(&self) -> Option<&str>;

    /// Parameters accepted by [`call`](Self::call).
    fn signature(&self) -> Signature;

    /// Invoke with the parsed argument bag.
    async fn call(&self, params: Params) -> Result<serde_json::Value>;
}

/// A function that can be shared across definitions.
pub type SharedFunction = Arc<dyn AgentFunction>;

type BoxedFn = Arc<dyn Fn(Params) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;

/// Closure-backed [`AgentFunction`].
#[derive(Clone)]
pub struct FnFunction {
    name: Option<String>,
    signature: Signature,
    f: BoxedFn,
}

impl FnFunction {
    pub fn new<F, Fut>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let mut function = Self::anonymous(signature, f);
        function.name = Some(name.into());
        function
    }

    /// A closure with no inferable name; the name must be given at registration.
    pub fn anonymous<F, Fut>(signature: Signature, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: None,
            signature,
            f: Arc::new(move |params| Box::pin(f(params))),
        }
    }

    /// Wrap a synchronous closure.
    pub fn sync<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Params) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Self::new(name, signature, move |params| {
            let result = f(params);
            async move { result }
        })
    }
}

impl fmt::Debug for FnFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AgentFunction for FnFunction {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    async fn call(&self, params: Params) -> Result<serde_json::Value> {
        (self.f)(params).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Table
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of function implementations keyed by name.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, SharedFunction>,
}

impl FunctionTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under an explicit name.
    ///
    /// If a function with the same name already exists, it will be replaced.
    pub fn register(&mut self, name: impl Into<String>, function: SharedFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<SharedFunction> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Invoke a function by name.
    ///
    /// Every required parameter of the implementation's signature must be
    /// present; all supplied parameters are passed through.
    pub async fn invoke(&self, name: &str, params: Params) -> Result<serde_json::Value> {
        let function = self
            .get(name)
            .ok_or_else(|| AgentError::FunctionNotFound(name.to_string()))?;

        if let Some(missing) = function
            .signature()
            .required_names()
            .find(|p| !params.contains_key(*p))
        {
            return Err(AgentError::MissingParameter {
                function: name.to_string(),
                parameter: missing.to_string(),
            });
        }

        tracing::debug!(function = %name, params = params.len(), "Invoking function");
        function.call(params).await
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
