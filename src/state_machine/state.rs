//! Conversation state types

use crate::catalog::Category;
use crate::config::FlowLimits;
use crate::db::{CandidateQuery, Item, ItemId, NewItem, UserId};
use crate::geo::GeoPoint;
use crate::market::BrowseFilters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-user facts the transitions need but do not own
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub user_id: UserId,
    /// Location saved on the user's profile
    pub saved_location: Option<GeoPoint>,
    pub saved_location_label: Option<String>,
    pub limits: FlowLimits,
}

impl SessionContext {
    pub fn new(user_id: UserId, limits: FlowLimits) -> Self {
        Self {
            user_id,
            saved_location: None,
            saved_location_label: None,
            limits,
        }
    }

    pub fn with_location(mut self, point: GeoPoint, label: Option<String>) -> Self {
        self.saved_location = Some(point);
        self.saved_location_label = label;
        self
    }
}

/// The single active flow of a user
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowState {
    /// No flow; the user sits at the main menu
    #[default]
    Idle,

    CreatingItem { step: CreateStep, draft: ItemDraft },

    Browsing { step: BrowseStep, session: BrowseSession },
}

impl FlowState {
    pub fn is_idle(&self) -> bool {
        matches!(self, FlowState::Idle)
    }

    /// Waiting on a repository call rather than on the user
    pub fn is_busy(&self) -> bool {
        match self {
            FlowState::Idle => false,
            FlowState::CreatingItem { step, .. } => matches!(step, CreateStep::Submitting),
            FlowState::Browsing { step, .. } => matches!(
                step,
                BrowseStep::FetchingCandidate
                    | BrowseStep::LoadingOwnItems
                    | BrowseStep::SubmittingProposal { .. }
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStep {
    ChoosingCategory,
    EnteringTitle,
    EnteringDescription,
    EnteringPrice,
    AwaitingPhoto,
    AwaitingLocation,
    Confirming,
    /// Create request issued, waiting for the outcome
    Submitting,
}

/// Fields collected so far by the posting flow
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemDraft {
    pub category: Option<Category>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub photo: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_label: Option<String>,
    /// The flow asked for a location (the user had none saved)
    pub asked_location: bool,
}

impl ItemDraft {
    /// Build the insert request once every required field is present
    pub fn to_new_item(&self, owner_id: UserId) -> Option<NewItem> {
        Some(NewItem {
            owner_id,
            category: self.category?,
            title: self.title.clone()?,
            description: self.description.clone()?,
            price: self.price,
            photo: self.photo.clone(),
            location: self.location,
            location_label: self.location_label.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowseStep {
    ChoosingCategory,
    /// Candidate lookup in flight
    FetchingCandidate,
    ShowingAds,
    /// Viewer's own items requested for a swap offer
    LoadingOwnItems,
    SelectingOwnItemForSwap { options: Vec<Item> },
    SubmittingProposal { offered: ItemId },
}

/// Browsing pass state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrowseSession {
    pub category: Option<Category>,
    pub filters: BrowseFilters,
    /// Last traversed item id; 0 before the first candidate
    pub cursor: ItemId,
    pub origin: Option<GeoPoint>,
    /// Item currently on screen
    pub current: Option<Item>,
    /// Every candidate fetched in this pass, shown or filtered out
    pub visited: BTreeSet<ItemId>,
}

impl BrowseSession {
    /// Candidate lookup for the current cursor; `None` before a category is chosen
    pub fn query(&self, context: &SessionContext) -> Option<CandidateQuery> {
        Some(CandidateQuery {
            category: self.category?,
            viewer_id: context.user_id,
            cursor: self.cursor,
            origin: self.origin,
            max_distance_km: self
                .filters
                .radius_km
                .unwrap_or(context.limits.default_radius_km),
        })
    }
}
