//! Core types for the agent crate.
//!
//! - [`Dispatch`]: outcome of one `run_agent` call
//! - [`Interpolations`]: `%{key}` substitutions applied to system directives
//! - [`Callbacks`]: caller overrides for state-map actions

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bot_team_llm::Params;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch Result
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The model answered with text.
    Text(String),
    /// One function was invoked; this is its return value.
    Output(serde_json::Value),
    /// Several function calls were invoked in order; skipped calls and
    /// empty results contribute nothing.
    Outputs(Vec<serde_json::Value>),
    /// Ignored, skipped, or a function returned nothing.
    Nothing,
}

impl Dispatch {
    /// Wrap a function return value; `null` becomes [`Dispatch::Nothing`].
    pub fn from_output(value: serde_json::Value) -> Self {
        if value.is_null() {
            Self::Nothing
        } else {
            Self::Output(value)
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Text result, or a function output that is a JSON string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Output(serde_json::Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// The result as a single JSON value.
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Self::Text(text) => Some(serde_json::Value::String(text)),
            Self::Output(value) => Some(value),
            Self::Outputs(values) => Some(serde_json::Value::Array(values)),
            Self::Nothing => None,
        }
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) | Self::Output(serde_json::Value::String(text)) => f.write_str(text),
            Self::Output(value) => write!(f, "{}", value),
            Self::Outputs(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    match value {
                        serde_json::Value::String(text) => f.write_str(text)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                Ok(())
            }
            Self::Nothing => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interpolations
// ─────────────────────────────────────────────────────────────────────────────

/// A substitution value.
#[derive(Clone)]
pub enum Interpolation {
    Text(String),
    /// Computed at substitution time, at most once per substitution pass.
    Lazy(Arc<dyn Fn() -> String + Send + Sync>),
}

impl fmt::Debug for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Named substitutions for `%{key}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Interpolations {
    values: BTreeMap<String, Interpolation>,
}

impl Interpolations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), Interpolation::Text(value.into()));
    }

    pub fn insert_lazy<F>(&mut self, key: impl Into<String>, f: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.values
            .insert(key.into(), Interpolation::Lazy(Arc::new(f)));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Replace every `%{key}` in `template`.
    ///
    /// Unknown placeholders are left in place. Lazy values are evaluated only
    /// if their key occurs, and only once per call.
    pub fn apply(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut resolved: HashMap<&str, String> = HashMap::new();
        let mut rest = template;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                rest = &rest[start..];
                break;
            };
            let key = &after[..end];
            match self.values.get_key_value(key) {
                Some((key, value)) => {
                    let text = resolved.entry(key.as_str()).or_insert_with(|| match value {
                        Interpolation::Text(text) => text.clone(),
                        Interpolation::Lazy(f) => f(),
                    });
                    out.push_str(text);
                }
                None => {
                    tracing::warn!(key = %key, "No interpolation value for placeholder");
                    out.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Handler for a state-map action: receives the action value and the
/// router's parameters with the discriminant removed.
pub type Callback = Arc<dyn Fn(String, Params) -> BoxFuture<'static, Result<Dispatch>> + Send + Sync>;

/// Caller overrides for the `agent` and `ignore` actions.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub agent: Option<Callback>,
    pub ignore: Option<Callback>,
}

fn boxed<F, Fut>(f: F) -> Callback
where
    F: Fn(String, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Dispatch>> + Send + 'static,
{
    Arc::new(move |value, params| Box::pin(f(value, params)))
}

impl Callbacks {
    /// Replace built-in agent hand-off.
    pub fn on_agent<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Dispatch>> + Send + 'static,
    {
        self.agent = Some(boxed(f));
        self
    }

    /// Replace the built-in ignore handler.
    pub fn on_ignore<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Dispatch>> + Send + 'static,
    {
        self.ignore = Some(boxed(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.agent.is_none() && self.ignore.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("agent", &self.agent.is_some())
            .field("ignore", &self.ignore.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
