//! Append-only message log for one query cycle.

use super::types::{ChatMessage, MessageRole};

/// Ordered conversation replayed verbatim to the model backend.
///
/// Entries are never edited once pushed; equality is structural, so two
/// conversations holding the same messages replay identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a conversation holding only the user's query.
    pub fn seed(query: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(query)],
        }
    }

    pub fn append_assistant(&mut self, message: ChatMessage) {
        debug_assert_eq!(message.role, MessageRole::Assistant);
        self.messages.push(message);
    }

    pub fn append_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(ChatMessage::tool(call_id, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
