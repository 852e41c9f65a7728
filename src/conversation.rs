//! Seed-once conversation for one agent instance.

use crate::types::*;

/// System + user seed messages, built lazily exactly once, followed by any
/// appended follow-up task messages. The seeds are never rewritten.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    seed: Option<[ChatMessage; 2]>,
    appended: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.seed.is_some()
    }

    /// Seed with rendered templates. Returns `false` (and changes nothing)
    /// if the conversation was already seeded.
    pub fn seed(&mut self, system: impl Into<String>, user: impl Into<String>) -> bool {
        if self.seed.is_some() {
            return false;
        }
        self.seed = Some([ChatMessage::system(system), ChatMessage::user(user)]);
        true
    }

    pub fn seed_messages(&self) -> Option<&[ChatMessage]> {
        self.seed.as_ref().map(|s| s.as_slice())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.appended.push(ChatMessage::user(content));
    }

    /// Seeds followed by appended messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.seed
            .iter()
            .flat_map(|s| s.iter().cloned())
            .chain(self.appended.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seed.as_ref().map_or(0, |_| 2) + self.appended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_once() {
        let mut conv = Conversation::new();
        assert!(!conv.is_seeded());
        assert!(conv.seed("sys", "task A"));
        assert!(!conv.seed("other sys", "task B"));

        let seeds = conv.seed_messages().unwrap();
        assert_eq!(seeds[0], ChatMessage::system("sys"));
        assert_eq!(seeds[1], ChatMessage::user("task A"));
    }

    #[test]
    fn test_appended_messages_follow_seeds() {
        let mut conv = Conversation::new();
        conv.seed("sys", "task A");
        conv.push_user("New task: task B");
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "New task: task B");
        assert_eq!(conv.seed_messages().unwrap()[1].content, "task A");
    }
}
