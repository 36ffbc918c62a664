//! Rolling conversation memory

use crate::llm::ChatMessage;

/// Default cap: 10 user/assistant exchanges
pub const DEFAULT_CONVERSATION_CAPACITY: usize = 20;

/// Bounded list of role/content messages, oldest evicted first
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    capacity: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CONVERSATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        if self.messages.len() > self.capacity {
            let excess = self.messages.len() - self.capacity;
            self.messages.drain(..excess);
        }
    }

    /// Append a user message and the reply to it
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(ChatMessage::user(user));
        self.push(ChatMessage::assistant(assistant));
    }

    /// The last `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
