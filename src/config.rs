//! Process-wide configuration
//!
//! Built once at start-up from the environment (after `.env` is loaded)
//! and shared read-only with the session and completion components.

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_PROMPT_PATH: &str = "docs/03-prompts.md";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_PORT: u16 = 8080;

const PROFILE_FILE: &str = "perfil_investidor.json";
const PRODUCTS_FILE: &str = "produtos_financeiros.json";
const TRANSACTIONS_FILE: &str = "transacoes.csv";

/// Completion endpoint settings
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

/// Locations of the prompt document and context data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub prompt: PathBuf,
    pub profile: PathBuf,
    pub products: PathBuf,
    pub transactions: PathBuf,
}

impl DataPaths {
    /// Standard file names under a data directory
    pub fn new(prompt: impl Into<PathBuf>, data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            prompt: prompt.into(),
            profile: data_dir.join(PROFILE_FILE),
            products: data_dir.join(PRODUCTS_FILE),
            transactions: data_dir.join(TRANSACTIONS_FILE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: EndpointConfig,
    pub paths: DataPaths,
    pub port: u16,
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = get("OPENAI_API_KEY").unwrap_or_default();

        let model = get("MODELO")
            .or_else(|| get("MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let temperature = match get("TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f32>().map_err(|_| {
                AssistantError::Config(format!("TEMPERATURE must be a number, got '{}'", raw))
            })?,
            None => DEFAULT_TEMPERATURE,
        };

        if !(0.0..=2.0).contains(&temperature) {
            return Err(AssistantError::Config(format!(
                "TEMPERATURE must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AssistantError::Config(format!("PORT must be a valid port number, got '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let prompt = get("PROMPT_PATH").unwrap_or_else(|| DEFAULT_PROMPT_PATH.to_string());
        let data_dir = get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        Ok(Self {
            endpoint: EndpointConfig {
                base_url,
                api_key,
                model,
                temperature,
            },
            paths: DataPaths::new(prompt, data_dir),
            port,
        })
    }
}
