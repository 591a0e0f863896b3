//! Builds provider requests from agent definitions.

use bot_team_llm::{ChatMessage, ChatRequest};

use crate::definition::AgentDefinition;

/// Bind a (runnable) definition to a message history.
///
/// Declared functions come first, forwarded functions after them; the
/// definition itself is not touched. System directives replace any system
/// messages already in the history.
pub fn build_request(definition: &AgentDefinition, messages: &[ChatMessage]) -> ChatRequest {
    let mut functions = definition.functions.clone();
    functions.extend(definition.forward_functions.iter().cloned());

    let mut request = ChatRequest {
        model: definition.model.clone(),
        messages: messages.to_vec(),
        max_tokens: definition.max_tokens,
        num_choices: definition.num_choices,
        temperature: definition.temperature,
        functions,
        function_call: definition.function_call.clone(),
    };

    if let Some(directives) = &definition.system_directives {
        request.replace_system_directives(directives.clone());
    }
    request
}
