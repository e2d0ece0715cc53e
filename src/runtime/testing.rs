//! In-memory doubles for exercising the market and engine without SQLite

use super::traits::*;
use crate::db::{
    CandidateQuery, Item, ItemId, ItemStatus, NewItem, NewProposal, NewRating, Proposal,
    ProposalId, ProposalStatus, User, UserField, UserId, DEFAULT_REPUTATION,
};
use crate::geo::{haversine_km, GeoPoint};
use crate::state_machine::Outbound;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// In-Memory Repository
// ============================================================================

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    items: BTreeMap<ItemId, Item>,
    views: HashSet<(ItemId, UserId)>,
    /// Insertion order; newest last
    favorites: Vec<(UserId, ItemId)>,
    proposals: BTreeMap<ProposalId, Proposal>,
    ratings: Vec<NewRating>,
    next_item_id: ItemId,
    next_proposal_id: ProposalId,
}

/// Repository with the same observable semantics as the SQLite one
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    failing_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent mutation fail while reads keep working
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of distinct view records for the pair (0 or 1)
    pub fn view_count(&self, item_id: ItemId, viewer_id: UserId) -> usize {
        usize::from(self.tables.lock().unwrap().views.contains(&(item_id, viewer_id)))
    }

    pub fn proposal_count(&self) -> usize {
        self.tables.lock().unwrap().proposals.len()
    }

    /// Soft-delete an item; the repository surface has no delete
    pub fn mark_deleted(&self, item_id: ItemId) {
        if let Some(item) = self.tables.lock().unwrap().items.get_mut(&item_id) {
            item.status = ItemStatus::Deleted;
        }
    }

    fn check(&self) -> RepoResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Storage("disk unavailable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> RepoResult<()> {
        self.check()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Storage("database is read-only".to_string()));
        }
        Ok(())
    }
}

fn distance_from(origin: Option<GeoPoint>, item: &Item) -> Option<f64> {
    match (origin, item.location) {
        (Some(from), Some(to)) => Some(haversine_km(from.lat, from.lon, to.lat, to.lon)),
        _ => None,
    }
}

/// Browse order: unlocated items first, then nearest, ties on id
fn sort_key(origin: Option<GeoPoint>, item: &Item) -> (f64, ItemId) {
    (distance_from(origin, item).unwrap_or(-1.0), item.id)
}

fn cmp_keys(a: (f64, ItemId), b: (f64, ItemId)) -> std::cmp::Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

impl Tables {
    fn require_item(&self, id: ItemId) -> RepoResult<()> {
        if self.items.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::NotFound(format!("Item not found: {id}")))
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_or_create_user(&self, id: UserId, display_name: &str) -> RepoResult<User> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables.users.entry(id).or_insert_with(|| User {
            id,
            display_name: display_name.to_string(),
            phone: None,
            location: None,
            location_label: None,
            reputation: DEFAULT_REPUTATION,
            total_swaps: 0,
            created_at: Utc::now(),
        });
        Ok(user.clone())
    }

    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn update_user_location(
        &self,
        id: UserId,
        point: GeoPoint,
        label: &str,
    ) -> RepoResult<()> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("User not found: {id}")))?;
        user.location = Some(point);
        user.location_label = Some(label.to_string());
        Ok(())
    }

    async fn update_user_field(&self, id: UserId, field: UserField, value: &str) -> RepoResult<()> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("User not found: {id}")))?;
        match field {
            UserField::Name => user.display_name = value.to_string(),
            UserField::Phone => user.phone = Some(value.to_string()),
            UserField::LocationLabel => user.location_label = Some(value.to_string()),
        }
        Ok(())
    }

    async fn create_item(&self, item: &NewItem) -> RepoResult<ItemId> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.contains_key(&item.owner_id) {
            return Err(RepoError::NotFound(format!("User not found: {}", item.owner_id)));
        }
        tables.next_item_id += 1;
        let id = tables.next_item_id;
        let now = Utc::now();
        tables.items.insert(
            id,
            Item {
                id,
                owner_id: item.owner_id,
                category: item.category,
                title: item.title.clone(),
                description: item.description.clone(),
                price: item.price,
                photo: item.photo.clone(),
                location: item.location,
                location_label: item.location_label.clone(),
                views: 0,
                status: ItemStatus::Active,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().items.get(&id).cloned())
    }

    async fn get_user_items(&self, owner_id: UserId, active_only: bool) -> RepoResult<Vec<Item>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .values()
            .rev()
            .filter(|i| i.owner_id == owner_id && i.status != ItemStatus::Deleted)
            .filter(|i| !active_only || i.is_active())
            .cloned()
            .collect())
    }

    async fn set_item_active(&self, id: ItemId, active: bool) -> RepoResult<()> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.items.get_mut(&id) {
            Some(item) if item.status != ItemStatus::Deleted => {
                item.status = if active {
                    ItemStatus::Active
                } else {
                    ItemStatus::Inactive
                };
                item.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(RepoError::NotFound(format!("Item not found: {id}"))),
        }
    }

    async fn next_candidate(&self, query: &CandidateQuery) -> RepoResult<Option<Item>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let bound = tables
            .items
            .get(&query.cursor)
            .map(|i| sort_key(query.origin, i));
        let candidate = tables
            .items
            .values()
            .filter(|i| {
                i.is_active() && i.category == query.category && i.owner_id != query.viewer_id
            })
            .filter(|i| {
                distance_from(query.origin, i).map_or(true, |d| d <= query.max_distance_km)
            })
            .filter(|i| bound.map_or(true, |b| cmp_keys(sort_key(query.origin, i), b).is_gt()))
            .min_by(|a, b| cmp_keys(sort_key(query.origin, a), sort_key(query.origin, b)));
        Ok(candidate.cloned())
    }

    async fn record_view(&self, item_id: ItemId, viewer_id: UserId) -> RepoResult<bool> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        tables.require_item(item_id)?;
        if tables.views.contains(&(item_id, viewer_id)) {
            return Ok(false);
        }
        let item = tables
            .items
            .get_mut(&item_id)
            .ok_or_else(|| RepoError::NotFound(format!("Item not found: {item_id}")))?;
        item.views += 1;
        tables.views.insert((item_id, viewer_id));
        Ok(true)
    }

    async fn add_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        tables.require_item(item_id)?;
        if tables.favorites.contains(&(user_id, item_id)) {
            return Ok(false);
        }
        tables.favorites.push((user_id, item_id));
        Ok(true)
    }

    async fn remove_favorite(&self, user_id: UserId, item_id: ItemId) -> RepoResult<bool> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.favorites.len();
        tables.favorites.retain(|f| *f != (user_id, item_id));
        Ok(tables.favorites.len() < before)
    }

    async fn get_favorites(&self, user_id: UserId) -> RepoResult<Vec<Item>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .favorites
            .iter()
            .rev()
            .filter(|(owner, _)| *owner == user_id)
            .filter_map(|(_, item_id)| tables.items.get(item_id))
            .filter(|i| i.status != ItemStatus::Deleted)
            .cloned()
            .collect())
    }

    async fn create_proposal(&self, proposal: &NewProposal) -> RepoResult<Option<ProposalId>> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        tables.require_item(proposal.liked_item_id)?;
        tables.require_item(proposal.proposer_item_id)?;
        let duplicate = tables.proposals.values().any(|p| {
            p.liked_item_id == proposal.liked_item_id
                && p.proposer_item_id == proposal.proposer_item_id
        });
        if duplicate {
            return Ok(None);
        }
        let title = |id: ItemId| tables.items.get(&id).map(|i| i.title.clone()).unwrap_or_default();
        let liked_item_title = title(proposal.liked_item_id);
        let proposer_item_title = title(proposal.proposer_item_id);
        tables.next_proposal_id += 1;
        let id = tables.next_proposal_id;
        tables.proposals.insert(
            id,
            Proposal {
                id,
                liked_item_id: proposal.liked_item_id,
                liked_item_title,
                proposer_item_id: proposal.proposer_item_id,
                proposer_item_title,
                proposer_id: proposal.proposer_id,
                target_id: proposal.target_id,
                message: proposal.message.clone(),
                status: ProposalStatus::Pending,
                created_at: Utc::now(),
                responded_at: None,
            },
        );
        Ok(Some(id))
    }

    async fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().proposals.get(&id).cloned())
    }

    async fn get_incoming_proposals(
        &self,
        user_id: UserId,
        status: Option<ProposalStatus>,
    ) -> RepoResult<Vec<Proposal>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .proposals
            .values()
            .rev()
            .filter(|p| p.target_id == user_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect())
    }

    async fn get_outgoing_proposals(&self, user_id: UserId) -> RepoResult<Vec<Proposal>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .proposals
            .values()
            .rev()
            .filter(|p| p.proposer_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> RepoResult<bool> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(proposal) = tables.proposals.get_mut(&id) else {
            return Ok(false);
        };
        if proposal.status != from {
            return Ok(false);
        }
        proposal.status = to;
        proposal.responded_at = Some(Utc::now());
        let participants = [proposal.proposer_id, proposal.target_id];
        if to == ProposalStatus::Completed {
            for user_id in participants {
                if let Some(user) = tables.users.get_mut(&user_id) {
                    user.total_swaps += 1;
                }
            }
        }
        Ok(true)
    }

    async fn add_rating(&self, rating: &NewRating) -> RepoResult<Option<f64>> {
        self.check_write()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(proposal_id) = rating.proposal_id {
            if !tables.proposals.contains_key(&proposal_id) {
                return Err(RepoError::NotFound(format!("Proposal not found: {proposal_id}")));
            }
        }
        let duplicate = tables.ratings.iter().any(|r| {
            r.rater_id == rating.rater_id
                && r.rated_id == rating.rated_id
                && r.proposal_id == rating.proposal_id
        });
        if duplicate {
            return Ok(None);
        }
        tables.ratings.push(rating.clone());
        let (sum, count) = tables
            .ratings
            .iter()
            .filter(|r| r.rated_id == rating.rated_id)
            .fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r.score), count + 1));
        let average = f64::from(sum) / f64::from(count);
        if let Some(user) = tables.users.get_mut(&rating.rated_id) {
            user.reputation = average;
        }
        Ok(Some(average))
    }
}

// ============================================================================
// Recording Notifier
// ============================================================================

/// Notifier that keeps every delivery for later inspection
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(UserId, Outbound)>>,
    unreachable: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier whose every delivery fails
    pub fn unreachable() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            unreachable: true,
        }
    }

    pub fn deliveries(&self) -> Vec<(UserId, Outbound)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, user_id: UserId, message: &Outbound) -> Result<(), DeliveryError> {
        if self.unreachable {
            return Err(DeliveryError::NoSubscriber(user_id));
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((user_id, message.clone()));
        Ok(())
    }
}
