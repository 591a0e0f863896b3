//! Response interpretation.
//!
//! Decides whether a response is a final message or a request to call
//! functions. Stateless; multiple choices are not reconciled here.

use bot_team_llm::{ChatResponse, Choice, ParsedFunctionCall};

/// What a response asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Final text.
    Text(String),
    /// Function calls, in order. Calls whose arguments failed to parse are
    /// kept with `arguments: None` so the caller can skip them.
    FunctionCalls(Vec<ParsedFunctionCall>),
    /// Neither usable text nor a function call.
    Empty,
}

/// Interpret a whole response by its first choice.
///
/// Later choices are ignored; use [`interpret_choices`] to see them.
pub fn interpret(response: &ChatResponse) -> Interpretation {
    response
        .choices()
        .first()
        .map_or(Interpretation::Empty, interpret_choice)
}

/// Interpret a single choice on its own.
pub fn interpret_choice(choice: &Choice) -> Interpretation {
    if !choice.message.tool_calls.is_empty() {
        return Interpretation::FunctionCalls(
            choice.message.tool_calls.iter().map(|c| c.parse()).collect(),
        );
    }
    match choice.message.text() {
        Some(text) if !text.trim().is_empty() => Interpretation::Text(text.to_string()),
        _ => Interpretation::Empty,
    }
}

/// Interpret every choice independently, in order.
pub fn interpret_choices(response: &ChatResponse) -> Vec<Interpretation> {
    response.choices().iter().map(interpret_choice).collect()
}
