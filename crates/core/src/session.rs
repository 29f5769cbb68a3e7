use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Per-session conversation state.
///
/// History is append-only for the life of the session and never shared
/// across sessions; prompting reads a bounded window of it via
/// [`SessionContext::recent`].
#[derive(Debug)]
pub struct SessionContext {
    id: Uuid,
    history: Vec<ConversationTurn>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The most recent `max_turns` turns, oldest first. Older turns are
    /// dropped from view, never summarized.
    pub fn recent(&self, max_turns: usize) -> &[ConversationTurn] {
        let start = self.history.len().saturating_sub(max_turns);
        &self.history[start..]
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
