//! Financial Chat Assistant
//!
//! Back-end for a chat-based personal finance assistant that:
//! - Loads its instructions from the first fenced block of a prompt document
//! - Enriches them with the investor profile and product catalog (JSON)
//! - Appends a per-category spending summary built from a transactions CSV
//! - Relays the conversation to an OpenAI-compatible completion endpoint
//! - Streams replies to a chat UI over HTTP
//!
//! TURN LOOP:
//! ASSEMBLE PROMPT → SYNC HISTORY → COMPLETE (STREAM) → APPEND | ROLL BACK

pub mod api;
pub mod assistant;
pub mod completion;
pub mod config;
pub mod error;
pub mod memory;
pub mod prompt;
pub mod state;
pub mod transactions;

pub use error::Result;

// Re-export common types
pub use assistant::{Assistant, PromptAssembly, SpendingFilter, Turn};
pub use completion::{CompletionBackend, CompletionRequest, OpenAiClient};
pub use config::AppConfig;
pub use error::AssistantError;
pub use memory::{ConversationHistory, MessageRole};
