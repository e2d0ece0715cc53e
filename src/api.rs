//! HTTP adapter over the market
//!
//! The chat transport posts user events here and subscribes to
//! notifications; everything else is profile and proposal upkeep.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::config::MarketConfig;
use crate::db::Database;
use crate::runtime::{
    ConversationEngine, DatabaseRepository, InMemorySessionStore, NotificationHub, ProductionEngine,
};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProductionEngine>,
    pub sessions: Arc<InMemorySessionStore>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    pub fn new(db: Database, config: &MarketConfig) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new());
        let hub = Arc::new(NotificationHub::new());
        let engine = ConversationEngine::new(
            DatabaseRepository::new(db),
            sessions.clone(),
            hub.clone(),
            config.limits,
        );
        Self {
            engine: Arc::new(engine),
            sessions,
            hub,
        }
    }

    pub fn repo(&self) -> &DatabaseRepository {
        self.engine.repository()
    }
}
