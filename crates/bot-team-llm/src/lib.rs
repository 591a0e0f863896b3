//! Chat completion gateway for bot-team.
//!
//! The core abstraction is the [`Gateway`] trait: one provider round trip
//! per call, success or error. [`RestGateway`] talks to OpenAI-compatible
//! endpoints; [`MockGateway`] replays scripted responses for tests.
//!
//! ```text
//! ChatRequest ──▶ Gateway::call ──▶ ChatResponse
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!     RestGateway         MockGateway
//! ```

pub mod error;
pub mod gateway;
pub mod rest;
pub mod types;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, MockGateway, SharedGateway, with_retry};
pub use rest::{RestGateway, RestGatewayConfig};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FunctionCall, Params, ParsedFunctionCall,
    PromptTokensDetails, Role, ToolCall, Usage, WireRequest, parse_function_arguments,
};
