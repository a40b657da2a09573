//! Conversation history fed to the inference engine.

use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged turn.
///
/// Serializes as `{"role": "...", "content": "..."}`, the message shape
/// chat-style inference APIs expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered sequence of turns shared by every connected session.
///
/// The leading system turn, if any, is never evicted. With no cap configured
/// the history grows for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    max_turns: Option<usize>,
}

impl ConversationHistory {
    /// Create a history, optionally seeded with a system prompt.
    pub fn new(system_prompt: Option<String>) -> Self {
        let turns = system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(|p| vec![Turn::system(p)])
            .unwrap_or_default();
        Self {
            turns,
            max_turns: None,
        }
    }

    /// Cap the number of non-system turns kept. Oldest turns go first.
    ///
    /// The newest turn is always kept, so a cap of zero behaves as one.
    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self.enforce_cap();
        self
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.enforce_cap();
    }

    /// All turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Owned copy of the turns, used to hand the history to a generation
    /// without holding any lock.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn enforce_cap(&mut self) {
        let Some(max) = self.max_turns.map(|max| max.max(1)) else {
            return;
        };
        let pinned = usize::from(matches!(self.turns.first(), Some(t) if t.role == Role::System));
        let conversational = self.turns.len() - pinned;
        if conversational > max {
            self.turns.drain(pinned..pinned + (conversational - max));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_seeds_system_prompt() {
        let history = ConversationHistory::new(Some("You are a French teacher.".to_string()));
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::System);
    }

    #[test]
    fn test_blank_system_prompt_is_ignored() {
        let history = ConversationHistory::new(Some("   ".to_string()));
        assert!(history.is_empty());
    }

    #[test]
    fn test_push_keeps_order() {
        let mut history = ConversationHistory::new(None);
        history.push(Turn::user("Bonjour"));
        history.push(Turn::assistant("Bonjour ! Très bien."));
        assert_eq!(
            history.turns(),
            &[Turn::user("Bonjour"), Turn::assistant("Bonjour ! Très bien.")]
        );
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut history = ConversationHistory::new(Some("sys".to_string()));
        for i in 0..500 {
            history.push(Turn::user(format!("message {}", i)));
        }
        assert_eq!(history.len(), 501);
    }

    #[test]
    fn test_cap_evicts_oldest_but_keeps_system() {
        let mut history = ConversationHistory::new(Some("sys".to_string())).with_max_turns(Some(2));
        history.push(Turn::user("one"));
        history.push(Turn::assistant("two"));
        history.push(Turn::user("three"));

        assert_eq!(
            history.turns(),
            &[Turn::system("sys"), Turn::assistant("two"), Turn::user("three")]
        );
    }

    #[test]
    fn test_turn_serializes_as_chat_message() {
        let json = serde_json::to_value(Turn::user("Salut")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "Salut"}));
    }

    #[test]
    fn test_zero_cap_keeps_newest_turn() {
        let mut history =
            ConversationHistory::new(Some("sys".to_string())).with_max_turns(Some(0));
        history.push(Turn::user("Bonjour"));
        assert_eq!(history.turns(), &[Turn::system("sys"), Turn::user("Bonjour")]);

        history.push(Turn::assistant("Salut"));
        assert_eq!(history.turns(), &[Turn::system("sys"), Turn::assistant("Salut")]);
    }
}
