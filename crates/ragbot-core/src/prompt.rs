//! Prompt assembly for the answer model.

use crate::completion::{Message, Role};
use crate::models::ChatTurn;

/// Instruction prepended to retrieved context.
pub const CITATION_INSTRUCTION: &str = "Answer using the numbered context below. \
Cite every fact you take from it with the bracketed number of its source, for example [1] or [2][3]. \
Never state facts that are not supported by a cited source; if the context does not contain the answer, say so.";

/// Everything needed to build one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub system: Option<&'a str>,
    pub history: &'a [ChatTurn],
    /// Output of [`build_context`](crate::retrieval::build_context); may be empty.
    pub context: &'a str,
    pub user_message: &'a str,
}

/// Build the ordered message list:
///
/// 1. the system instruction, if present and not blank;
/// 2. the history turns, in order;
/// 3. if the context is not blank, a system message carrying
///    [`CITATION_INSTRUCTION`] and the context;
/// 4. the user message.
pub fn build_prompt(input: &PromptInput<'_>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(input.history.len() + 3);

    if let Some(system) = input.system.map(str::trim).filter(|s| !s.is_empty()) {
        messages.push(Message::system(system));
    }

    messages.extend(input.history.iter().map(|turn| Message {
        role: Role::from(turn.role),
        content: turn.content.clone(),
    }));

    let context = input.context.trim();
    if !context.is_empty() {
        messages.push(Message::system(format!(
            "{}\n\nContext:\n{}",
            CITATION_INSTRUCTION, context
        )));
    }

    messages.push(Message::user(input.user_message));
    messages
}
