use crate::models::chat::{ Message, Role };

/// Ordered, append-only record of one conversation.
///
/// Turn alternation is not validated here: the client appends a user message
/// followed by its assistant reply for every completed turn, and callers that
/// overwrite the history with `replace` are responsible for keeping it
/// coherent.
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Copy of the current messages, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages to send with the next request. `None` sends everything;
    /// `Some(k)` keeps the last `k` turns and never starts on an assistant
    /// message.
    pub fn window(&self, max_turns: Option<usize>) -> Vec<Message> {
        let Some(turns) = max_turns else {
            return self.snapshot();
        };
        let keep = turns.saturating_mul(2);
        let mut start = self.messages.len().saturating_sub(keep);
        while start < self.messages.len() && self.messages[start].role == Role::Assistant {
            start += 1;
        }
        self.messages[start..].to_vec()
    }
}
