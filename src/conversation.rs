use crate::protocol::message::{Message, Role};
use crate::protocol::request::ChatRequest;

/// Ordered, sealed turns of one chat session.
///
/// Only finished messages live here; the assistant message being streamed is
/// owned by the stream controller until it is sealed.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user question and build the request carrying the whole history.
    pub fn push_user(&mut self, text: impl Into<String>) -> ChatRequest {
        self.messages.push(Message::user(text));
        ChatRequest::from_messages(&self.messages)
    }

    /// Record a sealed assistant answer.
    pub fn push_assistant(&mut self, message: Message) {
        debug_assert_eq!(message.role, Role::Assistant);
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_user_returns_full_history() {
        let mut conversation = Conversation::new();
        let first = conversation.push_user("how many cars?");
        assert_eq!(first.messages.len(), 1);

        let mut answer = Message::assistant_placeholder();
        answer.content = "Three.".to_string();
        answer.thoughts = Some("count rows".to_string());
        conversation.push_assistant(answer);

        let second = conversation.push_user("and trucks?");
        let turns: Vec<(Role, &str)> = second
            .messages
            .iter()
            .map(|entry| (entry.role, entry.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            [
                (Role::User, "how many cars?"),
                (Role::Assistant, "Three."),
                (Role::User, "and trucks?"),
            ]
        );
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut conversation = Conversation::new();
        conversation.push_user("hi");
        conversation.clear();
        assert!(conversation.is_empty());
    }
}
