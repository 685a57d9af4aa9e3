//! Conversation history resent to the inference server on every turn

use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the dialogue
///
/// Serializes to the `{"role": ..., "content": ...}` shape the chat endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only, chronologically ordered dialogue history
///
/// Never truncated: every turn is kept for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Create an empty history
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Record the user's side of a new turn
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    /// Record the assistant's reply
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    /// Drop a trailing user message whose reply never arrived
    ///
    /// Returns the removed turn. Assistant turns are never removed.
    pub fn discard_unanswered(&mut self) -> Option<Turn> {
        if self.turns.last().is_some_and(|t| t.role == Role::User) {
            self.turns.pop()
        } else {
            None
        }
    }

    /// All turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of recorded messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether nothing has been said yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Total characters across all messages
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }
}
