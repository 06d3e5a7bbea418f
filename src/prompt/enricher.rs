//! Context enrichment
//!
//! Appends pretty-printed JSON documents to the base instructions under
//! labelled headings.

use crate::error::AssistantError;
use crate::Result;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const PROFILE_HEADING: &str = "Perfil do Investidor";
pub const PRODUCTS_HEADING: &str = "Produtos Financeiros Disponíveis";

/// Builder that appends one section per present document, in call order
#[derive(Debug, Clone)]
pub struct ContextEnricher {
    prompt: String,
}

impl ContextEnricher {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            prompt: base.into(),
        }
    }

    /// Append `document` under `heading`; `None` contributes nothing
    pub fn with_section(mut self, heading: &str, document: Option<&Value>) -> Self {
        if let Some(document) = document {
            match serde_json::to_string_pretty(document) {
                Ok(rendered) => {
                    self.prompt.push_str(&format!("\n\n{}:\n{}", heading, rendered));
                }
                Err(e) => warn!(heading, "Skipping unserializable context section: {}", e),
            }
        }
        self
    }

    pub fn finish(self) -> String {
        self.prompt
    }
}

/// Append profile then products sections to `base`
pub fn enrich_prompt(base: &str, profile: Option<&Value>, products: Option<&Value>) -> String {
    ContextEnricher::new(base)
        .with_section(PROFILE_HEADING, profile)
        .with_section(PRODUCTS_HEADING, products)
        .finish()
}

/// Read and parse a JSON context document
pub fn load_json_document(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();

    let raw = fs::read_to_string(path).map_err(|e| {
        AssistantError::JsonLoad(format!("cannot read '{}': {}", path.display(), e))
    })?;

    serde_json::from_str(&raw).map_err(|e| {
        AssistantError::JsonLoad(format!("invalid JSON in '{}': {}", path.display(), e))
    })
}
