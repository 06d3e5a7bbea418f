//! Error types for the financial chat assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Context Loading Errors
    // =============================

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("JSON load error: {0}")]
    JsonLoad(String),

    #[error("Schema error: {0}")]
    Schema(String),

    // =============================
    // Conversation Errors
    // =============================

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        AssistantError::Completion(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for AssistantError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        AssistantError::Completion(err.to_string())
    }
}

impl AssistantError {
    /// True for failures that only degrade one prompt section
    pub fn is_context_error(&self) -> bool {
        matches!(
            self,
            AssistantError::NotFound(_) | AssistantError::JsonLoad(_) | AssistantError::Schema(_)
        )
    }
}
