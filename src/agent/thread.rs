use uuid::Uuid;

use crate::llm::ChatMessage;

/// Append-only conversation history for one session.
#[derive(Debug, Clone)]
pub struct ChatThread {
    id: Uuid,
    messages: Vec<ChatMessage>,
}

impl Default for ChatThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatThread {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
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

    /// Append a completed turn's messages in order.
    pub fn append(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }
}
