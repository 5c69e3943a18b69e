//! In-memory map from session id to relay.
//!
//! Each entry is wrapped in its own async mutex so a session never has more
//! than one remote call in flight. Idle sessions are dropped lazily whenever
//! the store is touched; nothing runs in the background.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{chat::ChatProvider, session::ChatRelay};

struct Entry {
    relay: Arc<Mutex<ChatRelay>>,
    last_seen: Instant,
}

/// A session looked up (or created) by [`SessionStore::checkout`].
pub struct SessionHandle {
    pub id: Uuid,
    pub relay: Arc<Mutex<ChatRelay>>,
    /// True when no live session matched the requested id
    pub created: bool,
}

/// Owns every live session of the process.
pub struct SessionStore {
    provider: Arc<dyn ChatProvider>,
    instruction: Arc<str>,
    ttl: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `provider` - Remote model handed to every new relay
    /// * `instruction` - Instruction prompt for new sessions
    /// * `ttl` - Idle time after which a session is forgotten
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        instruction: impl Into<Arc<str>>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            instruction: instruction.into(),
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `id`, or a fresh one if `id` is absent,
    /// unknown or expired.
    pub async fn checkout(&self, id: Option<Uuid>) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < self.ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            log::info!("expired {} idle session(s)", expired);
        }

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return SessionHandle {
                    id,
                    relay: entry.relay.clone(),
                    created: false,
                };
            }
        }

        let id = Uuid::new_v4();
        let relay = Arc::new(Mutex::new(ChatRelay::new(
            self.provider.clone(),
            self.instruction.clone(),
        )));
        sessions.insert(
            id,
            Entry {
                relay: relay.clone(),
                last_seen: now,
            },
        );
        log::info!("opened session {} ({} live)", id, sessions.len());
        SessionHandle {
            id,
            relay,
            created: true,
        }
    }

    /// Looks up a live session without refreshing or creating it.
    pub async fn peek(&self, id: Option<Uuid>) -> Option<Arc<Mutex<ChatRelay>>> {
        let id = id?;
        let sessions = self.sessions.lock().await;
        sessions
            .get(&id)
            .filter(|entry| entry.last_seen.elapsed() < self.ttl)
            .map(|entry| entry.relay.clone())
    }

    /// Number of live sessions, expired ones included until the next checkout.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, ChatResponse};
    use crate::error::RelayError;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl ChatProvider for Unreachable {
        async fn chat(&self, _: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, RelayError> {
            Err(RelayError::Remote("offline".to_string()))
        }
    }

    fn store(ttl: Duration) -> SessionStore {
        SessionStore::new(Arc::new(Unreachable), "rules", ttl)
    }

    #[tokio::test]
    async fn known_id_returns_same_session() {
        let store = store(Duration::from_secs(60));
        let first = store.checkout(None).await;
        assert!(first.created);

        let again = store.checkout(Some(first.id)).await;
        assert!(!again.created);
        assert_eq!(again.id, first.id);
        assert!(Arc::ptr_eq(&first.relay, &again.relay));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_id_opens_new_session() {
        let store = store(Duration::from_secs(60));
        let handle = store.checkout(Some(Uuid::new_v4())).await;
        assert!(handle.created);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = store(Duration::from_secs(60));
        let a = store.checkout(None).await;
        let b = store.checkout(None).await;
        assert_ne!(a.id, b.id);

        let _ = a.relay.lock().await.send_text("only in a").await;
        assert!(a.relay.lock().await.session().is_initialized());
        assert!(b.relay.lock().await.session().is_empty());
    }

    #[tokio::test]
    async fn idle_sessions_expire_on_next_checkout() {
        let store = store(Duration::from_millis(20));
        let old = store.checkout(None).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let next = store.checkout(Some(old.id)).await;
        assert!(next.created);
        assert_ne!(next.id, old.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn peek_never_creates_sessions() {
        let store = store(Duration::from_secs(60));
        assert!(store.peek(None).await.is_none());
        assert!(store.peek(Some(Uuid::new_v4())).await.is_none());
        assert_eq!(store.len().await, 0);

        let handle = store.checkout(None).await;
        let found = store.peek(Some(handle.id)).await.unwrap();
        assert!(Arc::ptr_eq(&found, &handle.relay));
        assert_eq!(store.len().await, 1);
    }
}
