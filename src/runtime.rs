//! Runtime for executing guided flows
//!
//! Holds the seams to storage, sessions, and notification delivery, plus
//! the engine that drives the pure state machine through them.

mod executor;
pub mod sessions;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationEngine, StepOutcome};
pub use sessions::InMemorySessionStore;
pub use traits::*;

use crate::db::UserId;
use crate::state_machine::Outbound;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Type alias for the production engine with concrete implementations
pub type ProductionEngine =
    ConversationEngine<DatabaseRepository, Arc<InMemorySessionStore>, Arc<NotificationHub>>;

const CHANNEL_CAPACITY: usize = 64;

/// Message pushed to a user outside of their own requests
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub message: Outbound,
    pub sent_at: DateTime<Utc>,
}

/// Per-user broadcast channels feeding the notification streams
#[derive(Default)]
pub struct NotificationHub {
    channels: RwLock<HashMap<UserId, broadcast::Sender<Notification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to notifications for `user_id`, creating the channel on
    /// first use
    pub async fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Notification> {
        if let Some(tx) = self.channels.read().await.get(&user_id) {
            return tx.subscribe();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Forget the channel once its last subscriber has gone away
    async fn release(&self, user_id: UserId) {
        let mut channels = self.channels.write().await;
        if channels.get(&user_id).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(&user_id);
        }
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn deliver(&self, user_id: UserId, message: &Outbound) -> Result<(), DeliveryError> {
        let tx = self
            .channels
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or(DeliveryError::NoSubscriber(user_id))?;
        let notification = Notification {
            user_id,
            message: message.clone(),
            sent_at: Utc::now(),
        };
        match tx.send(notification) {
            Ok(receivers) => {
                tracing::debug!(user_id, receivers, "Notification delivered");
                Ok(())
            }
            Err(_) => {
                self.release(user_id).await;
                Err(DeliveryError::NoSubscriber(user_id))
            }
        }
    }
}
