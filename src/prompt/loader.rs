//! System prompt document loading
//!
//! The prompt document is markdown; the instruction payload is the body of
//! its first fenced code block.

use crate::error::AssistantError;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, warn};

/// Instruction used when the document has no usable fenced block
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente útil.";

lazy_static! {
    // Opening fence may carry an info string; the block must start on a new line.
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)```").expect("valid fence regex");
}

/// Body of the first well-formed fenced block, trimmed
pub fn extract_fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

/// Load the base instruction text from a prompt document
///
/// Falls back to [`DEFAULT_SYSTEM_PROMPT`] when the document has no fenced
/// block. A missing document is an error.
pub fn load_system_prompt(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            AssistantError::NotFound(format!("prompt document '{}'", path.display()))
        }
        _ => AssistantError::IoError(e),
    })?;

    match extract_fenced_block(&content) {
        Some(prompt) => Ok(prompt),
        None => {
            warn!(
                path = %path.display(),
                "No fenced system prompt block found, using default instructions"
            );
            Ok(DEFAULT_SYSTEM_PROMPT.to_string())
        }
    }
}

/// Same as [`load_system_prompt`], substituting the default on any failure
pub fn load_system_prompt_or_default(path: impl AsRef<Path>) -> String {
    load_system_prompt(path.as_ref()).unwrap_or_else(|e| {
        error!("Failed to load system prompt: {}", e);
        DEFAULT_SYSTEM_PROMPT.to_string()
    })
}
