//! System prompt construction
//!
//! Loads the base instructions from the prompt document and enriches them
//! with the investor profile and product catalog.

pub mod enricher;
pub mod loader;

pub use enricher::{enrich_prompt, load_json_document, ContextEnricher, PRODUCTS_HEADING, PROFILE_HEADING};
pub use loader::{extract_fenced_block, load_system_prompt, load_system_prompt_or_default, DEFAULT_SYSTEM_PROMPT};
