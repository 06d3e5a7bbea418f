//! Chat turn handling
//!
//! Assembles the enriched system prompt from the prompt document and the
//! context files, keeps a session's history in sync with it, and relays each
//! user turn to the completion backend.
//!
//! Histories are owned values: every call takes one in and hands one back.

use crate::completion::{CompletionBackend, CompletionRequest};
use crate::config::{AppConfig, DataPaths};
use crate::error::AssistantError;
use crate::memory::{ConversationHistory, MessageRole};
use crate::prompt;
use crate::transactions::{self, DateRange, SpendingSummary};
use crate::Result;
use chrono::NaiveDate;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Optional date filter for the spending summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpendingFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Result of building the system prompt
#[derive(Debug, Clone, Serialize)]
pub struct PromptAssembly {
    pub prompt: String,
    /// Non-fatal problems with individual context files
    pub warnings: Vec<String>,
    pub spending: Option<SpendingSummary>,
    /// Earliest and latest transaction dates, for date pickers
    pub bounds: Option<DateRange>,
    /// Range actually applied to the spending summary
    pub range: Option<DateRange>,
    pub fingerprint: String,
}

/// Build the full system prompt
///
/// Only the prompt document can substitute content (the default
/// instructions); every context file failure just drops its section.
pub fn assemble_system_prompt(paths: &DataPaths, filter: SpendingFilter) -> PromptAssembly {
    let mut warnings = Vec::new();

    let base = match prompt::load_system_prompt(&paths.prompt) {
        Ok(base) => base,
        Err(e) => {
            warn!("Using default system prompt: {}", e);
            warnings.push(e.to_string());
            prompt::DEFAULT_SYSTEM_PROMPT.to_string()
        }
    };

    let profile = load_context_document(&paths.profile, &mut warnings);
    let products = load_context_document(&paths.products, &mut warnings);

    let mut prompt_text = prompt::enrich_prompt(&base, profile.as_ref(), products.as_ref());

    let mut spending = None;
    let mut bounds = None;
    let mut range = None;

    match transactions::load_transactions(&paths.transactions) {
        Ok(set) => {
            bounds = set.date_bounds();
            range = if set.has_dates {
                DateRange::resolve(filter.start_date, filter.end_date, bounds)
            } else {
                None
            };
            let summary = set.summarize(range);
            prompt_text = transactions::append_spending_section(&prompt_text, &summary);
            spending = Some(summary);
        }
        Err(AssistantError::NotFound(what)) => {
            debug!("No transactions loaded: {} not found", what);
        }
        Err(e) => {
            warn!("Skipping spending summary: {}", e);
            warnings.push(e.to_string());
        }
    }

    let fingerprint = prompt_fingerprint(&prompt_text);

    PromptAssembly {
        prompt: prompt_text,
        warnings,
        spending,
        bounds,
        range,
        fingerprint,
    }
}

fn load_context_document(path: &Path, warnings: &mut Vec<String>) -> Option<Value> {
    match prompt::load_json_document(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Skipping context section: {}", e);
            warnings.push(e.to_string());
            None
        }
    }
}

/// Short SHA256 hex digest identifying a prompt revision
pub fn prompt_fingerprint(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..8])
}

/// History handed back after a turn, plus the reply or the failure
#[derive(Debug)]
pub struct Turn {
    pub history: ConversationHistory,
    pub reply: Result<String>,
    /// The caller stopped the stream; `reply` holds the text shown so far
    pub interrupted: bool,
}

/// Shared, read-only collaborators of every chat turn
#[derive(Clone)]
pub struct Assistant {
    config: Arc<AppConfig>,
    backend: Arc<dyn CompletionBackend>,
}

impl Assistant {
    pub fn new(config: Arc<AppConfig>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current system prompt for `filter`
    pub fn assemble(&self, filter: SpendingFilter) -> PromptAssembly {
        assemble_system_prompt(&self.config.paths, filter)
    }

    /// Seed an empty history, or refresh the system message of an ongoing one
    pub fn sync_history(
        &self,
        mut history: ConversationHistory,
        assembly: &PromptAssembly,
    ) -> ConversationHistory {
        if history.is_empty() {
            history.reset(assembly.prompt.clone());
            info!(fingerprint = %assembly.fingerprint, "Conversation started");
        } else if history.system_prompt() != Some(assembly.prompt.as_str()) {
            history.replace_system(assembly.prompt.clone());
            debug!(fingerprint = %assembly.fingerprint, "System prompt refreshed");
        }
        history
    }

    /// Clear-history action: a single system message with the current prompt
    pub fn reset_history(
        &self,
        mut history: ConversationHistory,
        assembly: &PromptAssembly,
    ) -> ConversationHistory {
        history.reset(assembly.prompt.clone());
        info!(fingerprint = %assembly.fingerprint, "Conversation history cleared");
        history
    }

    fn request_for(&self, history: &ConversationHistory) -> CompletionRequest {
        let endpoint = &self.config.endpoint;
        CompletionRequest::from_history(history, &endpoint.model, endpoint.temperature)
    }

    /// Single-shot turn
    ///
    /// On failure the history comes back exactly as it went in.
    pub async fn respond(&self, mut history: ConversationHistory, user_text: &str) -> Turn {
        let checkpoint = history.len();
        history.append(MessageRole::User, user_text);

        let request = self.request_for(&history);
        match self.backend.complete(&request).await {
            Ok(answer) => {
                history.append(MessageRole::Assistant, answer.clone());
                Turn {
                    history,
                    reply: Ok(answer),
                    interrupted: false,
                }
            }
            Err(e) => {
                warn!("Completion failed, history left unchanged: {}", e);
                history.truncate(checkpoint);
                Turn {
                    history,
                    reply: Err(e),
                    interrupted: false,
                }
            }
        }
    }

    /// Streaming turn; `on_chunk` sees each delta as it arrives
    ///
    /// Returning `ControlFlow::Break` from `on_chunk` interrupts the stream:
    /// the text shown so far, including the chunk that returned `Break`, is
    /// kept in history as the reply. A failed stream discards the partial
    /// reply and rolls the history back.
    pub async fn respond_streaming<F>(
        &self,
        mut history: ConversationHistory,
        user_text: &str,
        mut on_chunk: F,
    ) -> Turn
    where
        F: FnMut(&str) -> ControlFlow<()> + Send,
    {
        let checkpoint = history.len();
        history.append(MessageRole::User, user_text);

        let request = self.request_for(&history);
        let outcome: Result<(String, bool)> = async {
            let mut stream = self.backend.stream(&request).await?;
            let mut answer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                answer.push_str(&chunk);
                if on_chunk(&chunk).is_break() {
                    return Ok((answer, true));
                }
            }
            Ok((answer, false))
        }
        .await;

        match outcome {
            Ok((answer, interrupted)) => {
                if interrupted {
                    info!(chars = answer.len(), "Streamed completion interrupted, partial reply kept");
                } else {
                    info!(chars = answer.len(), "Streamed completion finished");
                }
                history.append(MessageRole::Assistant, answer.clone());
                Turn {
                    history,
                    reply: Ok(answer),
                    interrupted,
                }
            }
            Err(e) => {
                warn!("Streaming completion failed, partial reply discarded: {}", e);
                history.truncate(checkpoint);
                Turn {
                    history,
                    reply: Err(e),
                    interrupted: false,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::prompt::PRODUCTS_HEADING;
    use futures::stream::{self, BoxStream};
    use std::fs;
    use std::sync::Mutex;

    /// Scripted backend recording every request it receives
    pub(crate) struct MockBackend {
        pub chunks: Vec<&'static str>,
        pub fail_after: Option<usize>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockBackend {
        pub(crate) fn replying(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                fail_after: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_after(chunks: Vec<&'static str>, n: usize) -> Self {
            Self {
                fail_after: Some(n),
                ..Self::replying(chunks)
            }
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for MockBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_after.is_some() {
                return Err(AssistantError::Completion("endpoint unreachable".into()));
            }
            Ok(self.chunks.concat())
        }

        async fn stream(
            &self,
            request: &CompletionRequest,
        ) -> Result<BoxStream<'static, Result<String>>> {
            self.requests.lock().unwrap().push(request.clone());
            let mut items: Vec<Result<String>> =
                self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(AssistantError::Completion("connection reset".into())));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    pub(crate) fn write_fixture(dir: &Path) -> DataPaths {
        let docs = dir.join("docs");
        let data = dir.join("data");
        fs::create_dir_all(&docs).unwrap();
        fs::create_dir_all(&data).unwrap();

        fs::write(
            docs.join("03-prompts.md"),
            "# Prompts\n\n## System Prompt\n\n```\nVocê é a Caca, assistente financeira.\n```\n",
        )
        .unwrap();
        fs::write(
            data.join("perfil_investidor.json"),
            r#"{"nome": "João", "perfil_investidor": "moderado"}"#,
        )
        .unwrap();
        fs::write(
            data.join("transacoes.csv"),
            "data,descricao,categoria,valor,tipo\n\
             2025-10-01,Aluguel,moradia,1200.00,saida\n\
             2025-10-05,Mercado,alimentacao,450.00,saida\n\
             2025-10-20,Cinema,lazer,60.00,saida\n",
        )
        .unwrap();

        DataPaths::new(docs.join("03-prompts.md"), &data)
    }

    pub(crate) fn test_config(paths: DataPaths) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            endpoint: EndpointConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                api_key: String::new(),
                model: "llama3".to_string(),
                temperature: 0.7,
            },
            paths,
            port: 0,
        })
    }

    #[test]
    fn test_assembly_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_fixture(dir.path());

        let assembly = assemble_system_prompt(&paths, SpendingFilter::default());

        assert!(assembly.prompt.starts_with("Você é a Caca, assistente financeira."));
        assert!(assembly.prompt.contains("Perfil do Investidor:\n{\n  \"nome\": \"João\""));
        assert!(!assembly.prompt.contains(PRODUCTS_HEADING));
        assert!(assembly.prompt.ends_with(
            "Resumo de Gastos:\nalimentacao: R$450.00\nlazer: R$60.00\nmoradia: R$1200.00"
        ));
        // products file is missing
        assert_eq!(assembly.warnings.len(), 1);
        assert_eq!(assembly.fingerprint.len(), 16);
    }

    #[test]
    fn test_assembly_applies_date_filter() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_fixture(dir.path());

        let filter = SpendingFilter {
            start_date: NaiveDate::from_ymd_opt(2025, 10, 5),
            end_date: None,
        };
        let assembly = assemble_system_prompt(&paths, filter);
        let spending = assembly.spending.unwrap();

        assert_eq!(spending.get("moradia"), None);
        assert_eq!(spending.len(), 2);
        assert_eq!(
            assembly.range.unwrap().end,
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap()
        );
    }

    #[test]
    fn test_assembly_with_bad_transactions_schema() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_fixture(dir.path());
        fs::write(&paths.transactions, "data,descricao\n2025-10-01,x\n").unwrap();

        let assembly = assemble_system_prompt(&paths, SpendingFilter::default());
        assert!(!assembly.prompt.contains("Resumo de Gastos"));
        assert!(assembly.spending.is_none());
        assert!(assembly.warnings.iter().any(|w| w.contains("Schema")));
    }

    #[test]
    fn test_assembly_without_prompt_document() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("none.md"), dir.path());

        let assembly = assemble_system_prompt(&paths, SpendingFilter::default());
        assert_eq!(assembly.prompt, prompt::DEFAULT_SYSTEM_PROMPT);
        assert!(assembly.spending.is_none());
    }

    #[test]
    fn test_sync_history_seeds_then_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::replying(vec!["ok"])),
        );

        let first = assistant.assemble(SpendingFilter::default());
        let mut history = assistant.sync_history(ConversationHistory::new(), &first);
        assert_eq!(history.len(), 1);
        history.append(MessageRole::User, "oi");

        let filtered = assistant.assemble(SpendingFilter {
            start_date: NaiveDate::from_ymd_opt(2025, 10, 10),
            end_date: None,
        });
        let history = assistant.sync_history(history, &filtered);

        assert_eq!(history.len(), 2);
        assert_eq!(history.system_prompt(), Some(filtered.prompt.as_str()));
        assert_ne!(first.fingerprint, filtered.fingerprint);
    }

    #[tokio::test]
    async fn test_respond_appends_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::replying(vec!["Você gastou ", "R$1710.00."]));
        let assistant = Assistant::new(test_config(write_fixture(dir.path())), backend.clone());

        let history = ConversationHistory::seeded("prompt");
        let turn = assistant.respond(history, "Quanto gastei?").await;

        assert_eq!(turn.reply.unwrap(), "Você gastou R$1710.00.");
        assert_eq!(turn.history.len(), 3);

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].model, "llama3");
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[1].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_failed_completion_leaves_history_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::failing_after(vec![], 0)),
        );

        let mut history = ConversationHistory::seeded("prompt");
        history.append(MessageRole::User, "antes");
        history.append(MessageRole::Assistant, "resposta");

        let turn = assistant.respond(history, "de novo").await;
        assert!(matches!(turn.reply, Err(AssistantError::Completion(_))));
        assert_eq!(turn.history.len(), 3);
        assert_eq!(turn.history.messages()[2].content, "resposta");
    }

    #[tokio::test]
    async fn test_streaming_turn_collects_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::replying(vec!["Olá", ", ", "João!"])),
        );

        let mut seen = Vec::new();
        let turn = assistant
            .respond_streaming(ConversationHistory::seeded("p"), "oi", |chunk| {
                seen.push(chunk.to_string());
                ControlFlow::Continue(())
            })
            .await;

        assert_eq!(seen, vec!["Olá", ", ", "João!"]);
        assert!(!turn.interrupted);
        assert_eq!(turn.reply.unwrap(), "Olá, João!");
        assert_eq!(turn.history.messages().last().unwrap().content, "Olá, João!");
    }

    #[tokio::test]
    async fn test_streaming_failure_discards_partial_reply() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::failing_after(vec!["parcial", "nunca"], 1)),
        );

        let turn = assistant
            .respond_streaming(ConversationHistory::seeded("p"), "oi", |_| {
                ControlFlow::Continue(())
            })
            .await;

        assert!(turn.reply.is_err());
        assert_eq!(turn.history.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_interrupted_keeps_displayed_text() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::replying(vec!["a", "b", "c"])),
        );

        let mut displayed = String::new();
        let turn = assistant
            .respond_streaming(ConversationHistory::seeded("p"), "oi", |chunk| {
                displayed.push_str(chunk);
                if displayed.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        assert_eq!(displayed, "ab");
        assert!(turn.interrupted);
        assert_eq!(turn.reply.unwrap(), "ab");

        let messages = turn.history.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "oi");
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[2].content, "ab");
    }

    #[test]
    fn test_reset_history() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(write_fixture(dir.path())),
            Arc::new(MockBackend::replying(vec![])),
        );

        let mut history = ConversationHistory::seeded("old");
        history.append(MessageRole::User, "oi");
        let assembly = assistant.assemble(SpendingFilter::default());
        let history = assistant.reset_history(history, &assembly);

        assert_eq!(history.len(), 1);
        assert!(history.system_prompt().unwrap().contains("Caca"));
    }
}
