//! Session state
//!
//! Per-chat conversation histories held in process memory. A history is
//! checked out for the duration of one turn and checked back in afterwards,
//! so only one turn ever owns it. Chats left idle longer than the store's
//! TTL are evicted.

use crate::error::AssistantError;
use crate::memory::ConversationHistory;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Idle time after which a chat's history is dropped
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Trait for session history storage
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Take a chat's history for one turn (empty if the chat is new)
    async fn checkout(&self, chat_id: Uuid) -> Result<ConversationHistory>;
    /// Return a history taken with `checkout`
    async fn checkin(&self, chat_id: Uuid, history: ConversationHistory);
    /// Copy of a chat's history, if it exists and is not mid-turn
    async fn snapshot(&self, chat_id: Uuid) -> Option<ConversationHistory>;
}

enum Slot {
    Idle {
        history: ConversationHistory,
        since: Instant,
    },
    Busy,
}

/// In-memory session store
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Slot>>>,
    idle_ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn evict_expired(&self, sessions: &mut HashMap<Uuid, Slot>) {
        let before = sessions.len();
        sessions.retain(|_, slot| match slot {
            Slot::Idle { since, .. } => since.elapsed() < self.idle_ttl,
            Slot::Busy => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle chats");
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn checkout(&self, chat_id: Uuid) -> Result<ConversationHistory> {
        let mut sessions = self.sessions.write().await;
        self.evict_expired(&mut sessions);

        match sessions.insert(chat_id, Slot::Busy) {
            Some(Slot::Idle { history, .. }) => Ok(history),
            None => Ok(ConversationHistory::new()),
            Some(Slot::Busy) => Err(AssistantError::SessionBusy(format!(
                "chat {} already has a reply in progress",
                chat_id
            ))),
        }
    }

    async fn checkin(&self, chat_id: Uuid, history: ConversationHistory) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            chat_id,
            Slot::Idle {
                history,
                since: Instant::now(),
            },
        );
    }

    async fn snapshot(&self, chat_id: Uuid) -> Option<ConversationHistory> {
        let sessions = self.sessions.read().await;
        match sessions.get(&chat_id) {
            Some(Slot::Idle { history, since }) if since.elapsed() < self.idle_ttl => {
                Some(history.clone())
            }
            _ => None,
        }
    }
}
