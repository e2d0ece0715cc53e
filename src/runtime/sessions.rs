//! Process-local session store
//!
//! Sessions are lost on restart. With a TTL configured, a background sweep
//! drops sessions nobody has touched for longer than the TTL.

use super::traits::SessionStore;
use crate::db::UserId;
use crate::state_machine::FlowState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct SessionEntry {
    state: FlowState,
    touched: Instant,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<UserId, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions last touched more than `ttl` before `now`
    pub async fn sweep_at(&self, ttl: Duration, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.touched) <= ttl);
        before - sessions.len()
    }

    /// Run `sweep_at` periodically until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, ttl: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = (ttl / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let expired = store.sweep_at(ttl, Instant::now()).await;
                if expired > 0 {
                    let remaining = store.len().await;
                    tracing::info!(expired, remaining, "Expired idle sessions");
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, user_id: UserId) -> Option<FlowState> {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .map(|entry| entry.state.clone())
    }

    async fn save(&self, user_id: UserId, state: FlowState) {
        self.sessions.write().await.insert(
            user_id,
            SessionEntry {
                state,
                touched: Instant::now(),
            },
        );
    }

    async fn clear(&self, user_id: UserId) {
        self.sessions.write().await.remove(&user_id);
    }
}
