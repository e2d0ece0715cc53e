//! API request and response types

use crate::db::{Item, ItemId, Proposal, ProposalId, ProposalStatus, User, UserField, UserId};
use crate::market::ErrorKind;
use crate::state_machine::UserInput;
use serde::{Deserialize, Serialize};

/// One chat event from the transport for the user in the path
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    /// Used only when the user is seen for the first time
    pub display_name: Option<String>,
    pub event: UserInput,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lon: f64,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub field: UserField,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub user_id: UserId,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProposalsQuery {
    pub status: Option<ProposalStatus>,
}

/// Request to move a proposal through its lifecycle
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub actor_id: UserId,
    pub status: ProposalStatus,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rater_id: UserId,
    pub rated_id: UserId,
    pub score: u8,
    pub comment: Option<String>,
    pub proposal_id: Option<ProposalId>,
}

/// Profile with a few derived counters
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub active_items: usize,
    pub pending_incoming: usize,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub struct ProposalsResponse {
    pub proposals: Vec<Proposal>,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub rated_id: UserId,
    pub reputation: f64,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: ItemId,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: Option<ErrorKind>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        Self {
            error: error.into(),
            kind,
        }
    }
}
