//! Session memory
//!
//! Conversation history owned by a single chat session.

pub mod store;

pub use store::{ConversationHistory, ConversationMessage, MessageRole};
