//! Conversation history storage
//!
//! Ordered chat messages for one session. The first message, when present,
//! is the system prompt and is the only one ever changed in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const TRANSCRIPT_DIVIDER_WIDTH: usize = 40;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Wire name used by chat-completion endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Name shown in exported transcripts
    pub fn display_name(&self) -> &'static str {
        match self {
            MessageRole::System => "Sistema",
            MessageRole::User => "Você",
            MessageRole::Assistant => "Caca",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }
}

/// Conversation history for a user session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: Vec<ConversationMessage>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Create a history holding only the system prompt
    pub fn seeded(system_prompt: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.reset(system_prompt);
        history
    }

    /// Add a message to history
    pub fn append(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(ConversationMessage::new(role, content));
        self.updated_at = Utc::now();
    }

    /// Overwrite the leading system message, keeping every later turn
    ///
    /// No-op when the history is empty or does not start with a system message.
    pub fn replace_system(&mut self, content: impl Into<String>) {
        if let Some(first) = self.messages.first_mut() {
            if first.role == MessageRole::System {
                first.content = content.into();
                self.updated_at = Utc::now();
            }
        }
    }

    /// Drop everything and start over from a single system message
    pub fn reset(&mut self, content: impl Into<String>) {
        self.messages.clear();
        self.append(MessageRole::System, content);
    }

    /// Cut the history back to `len` messages
    pub fn truncate(&mut self, len: usize) {
        if len < self.messages.len() {
            self.messages.truncate(len);
            self.updated_at = Utc::now();
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Messages a chat UI shows (everything but system messages)
    pub fn visible_messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Plain-text rendering of the conversation for download
    pub fn export_transcript(&self) -> String {
        let divider = "-".repeat(TRANSCRIPT_DIVIDER_WIDTH);
        let mut transcript = String::new();

        for msg in self.visible_messages() {
            transcript.push_str(&format!(
                "{}: {}\n{}\n",
                msg.role.display_name(),
                msg.content,
                divider
            ));
        }

        transcript
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
