//! Agent teams for bot-team.
//!
//! An agent is a named bundle of model parameters, a system prompt and the
//! functions the model may call. [`AgentRunner`] dispatches a conversation
//! to one agent and routes the response: final text is returned, function
//! calls are invoked, and a call to an agent's state-map router hands the
//! conversation to another agent, invokes a function, or ignores it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  AgentRunner                                                │
//! │  - Agent registry (pre-built or loaded by name)             │
//! │  - Function table, interpolations                           │
//! │  - Usage stats across the call chain                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌────────────┐  ┌────────────┐
//!       │ Gateway  │    │ Definition │  │ PriceTable │
//!       │(llm crate)│   │ + StateMap │  │            │
//!       └──────────┘    └────────────┘  └────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`AgentDefinition`]: reusable agent template
//! - [`FunctionTable`]: implementations keyed by function name
//! - [`interpret`]: text vs. function-call decision for a response
//! - [`UsageStats`]: token counts by (model, tier)
//! - [`PriceTable`]: per-million-token prices for [`total_cost`]

pub mod cost;
pub mod definition;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod request;
pub mod runner;
pub mod types;
pub mod usage;

pub use cost::{
    DEFAULT_PRICING_PATH, ModelPrices, PriceLookup, PriceTable, PricingError, TokenType,
    normalize_tier, total_cost,
};
pub use definition::{AgentDefinition, AgentDefinitionBuilder, FunctionOptions, ParameterSpec};
pub use error::{AgentError, Result};
pub use function::{AgentFunction, FnFunction, FunctionTable, Param, ParamKind, SharedFunction, Signature};
pub use interpreter::{Interpretation, interpret, interpret_choice, interpret_choices};
pub use request::build_request;
pub use runner::AgentRunner;
pub use types::{Callback, Callbacks, Dispatch, Interpolation, Interpolations};
pub use usage::{TokenCounts, UsageKey, UsageStats};
