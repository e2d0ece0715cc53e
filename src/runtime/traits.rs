//! Trait abstractions for runtime I/O
//!
//! The engine and the market services only see these seams, so tests can
//! swap in the in-memory doubles from `testing`.

use crate::db::{
    CandidateQuery, Database, DbError, Item, ItemId, NewItem, NewProposal, NewRating, Proposal,
    ProposalId, ProposalStatus, User, UserField, UserId,
};
use crate::geo::GeoPoint;
use crate::state_machine::{FlowState, Outbound};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a repository backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<DbError> for RepoError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UserNotFound(_) | DbError::ItemNotFound(_) | DbError::ProposalNotFound(_) => {
                RepoError::NotFound(err.to_string())
            }
            DbError::Sqlite(_) => RepoError::Storage(err.to_string()),
        }
    }
}

/// Durable store of users, items, views, favorites, proposals and ratings
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_or_create_user(&self, id: UserId, display_name: &str) -> RepoResult<User>;
    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    async fn update_user_location(&self, id: UserId, point: GeoPoint, label: &str)
        -> RepoResult<()>;
    async fn update_user_field(&self, id: UserId, field: UserField, value: &str) -> RepoResult<()>;

    async fn create_item(&self, item: &NewItem) -> RepoResult<ItemId>;
    async fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>>;
    async fn get_user_items(&self, owner_id: UserId, active_only: bool) -> RepoResult<Vec<Item>>;
    async fn set_item_active(&self, id: ItemId, active: bool) -> RepoResult<()>;

    /// Single candidate lookup, no wrap-around
    async fn next_candidate(&self, query: &CandidateQuery) -> RepoResult<Option<Item>>;
    /// Returns `true` only for the first view of a pair
    async fn record_view(&self, item_id: ItemId, viewer_id: UserId) -> RepoResult<bool>;

    async fn add_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool>;
    async fn remove_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool>;
    async fn get_favorites(&self, user_id: UserId) -> RepoResult<Vec<Item>>;

    /// `None` when the (liked, offered) pair already has a proposal
    async fn create_proposal(&self, proposal: &NewProposal) -> RepoResult<Option<ProposalId>>;
    async fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>>;
    async fn get_incoming_proposals(
        &self,
        user_id: UserId,
        status: Option<ProposalStatus>,
    ) -> RepoResult<Vec<Proposal>>;
    async fn get_outgoing_proposals(&self, user_id: UserId) -> RepoResult<Vec<Proposal>>;
    /// Compare-and-set; `false` when the stored status is no longer `from`
    async fn update_proposal_status(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> RepoResult<bool>;

    /// New average for the rated user, or `None` for a duplicate rating
    async fn add_rating(&self, rating: &NewRating) -> RepoResult<Option<f64>>;
}

/// Per-user conversation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Option<FlowState>;
    async fn save(&self, user_id: UserId, state: FlowState);
    async fn clear(&self, user_id: UserId);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("No subscriber for user {0}")]
    NoSubscriber(UserId),
}

/// Best-effort delivery of a message to some user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, user_id: UserId, message: &Outbound) -> Result<(), DeliveryError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Repository + ?Sized> Repository for Arc<T> {
    async fn get_or_create_user(&self, id: UserId, display_name: &str) -> RepoResult<User> {
        (**self).get_or_create_user(id, display_name).await
    }

    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        (**self).get_user(id).await
    }

    async fn update_user_location(
        &self,
        id: UserId,
        point: GeoPoint,
        label: &str,
    ) -> RepoResult<()> {
        (**self).update_user_location(id, point, label).await
    }

    async fn update_user_field(&self, id: UserId, field: UserField, value: &str) -> RepoResult<()> {
        (**self).update_user_field(id, field, value).await
    }

    async fn create_item(&self, item: &NewItem) -> RepoResult<ItemId> {
        (**self).create_item(item).await
    }

    async fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        (**self).get_item(id).await
    }

    async fn get_user_items(&self, owner_id: UserId, active_only: bool) -> RepoResult<Vec<Item>> {
        (**self).get_user_items(owner_id, active_only).await
    }

    async fn set_item_active(&self, id: ItemId, active: bool) -> RepoResult<()> {
        (**self).set_item_active(id, active).await
    }

    async fn next_candidate(&self, query: &CandidateQuery) -> RepoResult<Option<Item>> {
        (**self).next_candidate(query).await
    }

    async fn record_view(&self, item_id: ItemId, viewer_id: UserId) -> RepoResult<bool> {
        (**self).record_view(item_id, viewer_id).await
    }

    async fn add_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        (**self).add_favorite(user_id, item_id).await
    }

    async fn remove_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        (**self).remove_favorite(user_id, item_id).await
    }

    async fn get_favorites(&self, user_id: UserId) -> RepoResult<Vec<Item>> {
        (**self).get_favorites(user_id).await
    }

    async fn create_proposal(&self, proposal: &NewProposal) -> RepoResult<Option<ProposalId>> {
        (**self).create_proposal(proposal).await
    }

    async fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>> {
        (**self).get_proposal(id).await
    }

    async fn get_incoming_proposals(
        &self,
        user_id: UserId,
        status: Option<ProposalStatus>,
    ) -> RepoResult<Vec<Proposal>> {
        (**self).get_incoming_proposals(user_id, status).await
    }

    async fn get_outgoing_proposals(&self, user_id: UserId) -> RepoResult<Vec<Proposal>> {
        (**self).get_outgoing_proposals(user_id).await
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> RepoResult<bool> {
        (**self).update_proposal_status(id, from, to).await
    }

    async fn add_rating(&self, rating: &NewRating) -> RepoResult<Option<f64>> {
        (**self).add_rating(rating).await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load(&self, user_id: UserId) -> Option<FlowState> {
        (**self).load(user_id).await
    }

    async fn save(&self, user_id: UserId, state: FlowState) {
        (**self).save(user_id, state).await;
    }

    async fn clear(&self, user_id: UserId) {
        (**self).clear(user_id).await;
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn deliver(&self, user_id: UserId, message: &Outbound) -> Result<(), DeliveryError> {
        (**self).deliver(user_id, message).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use `Database` as a `Repository`
#[derive(Clone)]
pub struct DatabaseRepository {
    db: Database,
}

impl DatabaseRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repository for DatabaseRepository {
    async fn get_or_create_user(&self, id: UserId, display_name: &str) -> RepoResult<User> {
        Ok(self.db.get_or_create_user(id, display_name)?)
    }

    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        Ok(self.db.get_user(id)?)
    }

    async fn update_user_location(
        &self,
        id: UserId,
        point: GeoPoint,
        label: &str,
    ) -> RepoResult<()> {
        Ok(self.db.update_user_location(id, point, label)?)
    }

    async fn update_user_field(&self, id: UserId, field: UserField, value: &str) -> RepoResult<()> {
        Ok(self.db.update_user_field(id, field, value)?)
    }

    async fn create_item(&self, item: &NewItem) -> RepoResult<ItemId> {
        Ok(self.db.create_item(item)?)
    }

    async fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        Ok(self.db.get_item(id)?)
    }

    async fn get_user_items(&self, owner_id: UserId, active_only: bool) -> RepoResult<Vec<Item>> {
        Ok(self.db.get_user_items(owner_id, active_only)?)
    }

    async fn set_item_active(&self, id: ItemId, active: bool) -> RepoResult<()> {
        Ok(self.db.set_item_active(id, active)?)
    }

    async fn next_candidate(&self, query: &CandidateQuery) -> RepoResult<Option<Item>> {
        Ok(self.db.next_candidate(query)?)
    }

    async fn record_view(&self, item_id: ItemId, viewer_id: UserId) -> RepoResult<bool> {
        Ok(self.db.record_view(item_id, viewer_id)?)
    }

    async fn add_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        Ok(self.db.add_favorite(user_id, item_id)?)
    }

    async fn remove_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        Ok(self.db.remove_favorite(user_id, item_id)?)
    }

    async fn get_favorites(&self, user_id: UserId) -> RepoResult<Vec<Item>> {
        Ok(self.db.get_favorites(user_id)?)
    }

    async fn create_proposal(&self, proposal: &NewProposal) -> RepoResult<Option<ProposalId>> {
        Ok(self.db.create_proposal(proposal)?)
    }

    async fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>> {
        Ok(self.db.get_proposal(id)?)
    }

    async fn get_incoming_proposals(
        &self,
        user_id: UserId,
        status: Option<ProposalStatus>,
    ) -> RepoResult<Vec<Proposal>> {
        Ok(self.db.get_incoming_proposals(user_id, status)?)
    }

    async fn get_outgoing_proposals(&self, user_id: UserId) -> RepoResult<Vec<Proposal>> {
        Ok(self.db.get_outgoing_proposals(user_id)?)
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> RepoResult<bool> {
        Ok(self.db.update_proposal_status(id, from, to)?)
    }

    async fn add_rating(&self, rating: &NewRating) -> RepoResult<Option<f64>> {
        Ok(self.db.add_rating(rating)?)
    }
}
