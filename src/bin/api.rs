use financial_chat_assistant::{
    api::start_server,
    state::InMemorySessionStore,
    AppConfig, Assistant, OpenAiClient,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    if config.endpoint.api_key.is_empty() {
        eprintln!("⚠️  OPENAI_API_KEY not set; only keyless local endpoints will work");
    }

    info!("💰 Caca - Assistente Financeiro - API Server");
    info!("📍 Port: {}", config.port);
    info!("🔗 Endpoint: {} ({})", config.endpoint.base_url, config.endpoint.model);

    let backend = Arc::new(OpenAiClient::new(&config.endpoint)?);
    let assistant = Assistant::new(config.clone(), backend);
    let sessions = Arc::new(InMemorySessionStore::new());

    info!("📡 Starting API server...");

    start_server(assistant, sessions, config.port).await?;

    Ok(())
}
