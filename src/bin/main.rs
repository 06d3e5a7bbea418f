use financial_chat_assistant::{
    AppConfig, Assistant, ConversationHistory, OpenAiClient, SpendingFilter,
};
use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

const HELP: &str = "Commands: /clear, /spending, /export <file>, /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (stderr keeps the chat on stdout readable)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    dotenv::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);
    let backend = Arc::new(OpenAiClient::new(&config.endpoint)?);
    let assistant = Assistant::new(config.clone(), backend);

    info!(model = %config.endpoint.model, "Terminal chat starting");

    println!("💰 Caca - Assistente Financeiro");
    println!("{}", HELP);

    let assembly = assistant.assemble(SpendingFilter::default());
    for warning in &assembly.warnings {
        println!("⚠️  {}", warning);
    }
    let mut history = assistant.sync_history(ConversationHistory::new(), &assembly);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nVocê: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').unwrap_or((input, "")) {
            ("/quit", _) => break,
            ("/clear", _) => {
                let assembly = assistant.assemble(SpendingFilter::default());
                history = assistant.reset_history(history, &assembly);
                println!("History cleared.");
                continue;
            }
            ("/spending", _) => {
                let assembly = assistant.assemble(SpendingFilter::default());
                match assembly.spending {
                    Some(summary) if !summary.is_empty() => println!("{}", summary.format()),
                    _ => println!("No spending data."),
                }
                continue;
            }
            ("/export", path) if !path.trim().is_empty() => {
                std::fs::write(path.trim(), history.export_transcript())?;
                println!("Transcript written to {}", path.trim());
                continue;
            }
            (cmd, _) if cmd.starts_with('/') => {
                println!("{}", HELP);
                continue;
            }
            _ => {}
        }

        // Pick up edits to the context files between turns
        let assembly = assistant.assemble(SpendingFilter::default());
        history = assistant.sync_history(history, &assembly);

        print!("Caca: ");
        std::io::stdout().flush()?;

        let turn = assistant
            .respond_streaming(history, input, |chunk| {
                print!("{}", chunk);
                match std::io::stdout().flush() {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            })
            .await;
        history = turn.history;

        match turn.reply {
            Ok(_) if turn.interrupted => println!("\n[interrompido]"),
            Ok(_) => println!(),
            Err(e) => println!("\n❌ {}", e),
        }
    }

    Ok(())
}
