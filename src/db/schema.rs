//! Database schema and record types

use crate::catalog::Category;
use crate::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type ItemId = i64;
pub type ProposalId = i64;

/// Reputation of a user nobody has rated yet (midpoint of 1..=5)
pub const DEFAULT_REPUTATION: f64 = 3.0;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    phone TEXT,
    lat REAL,
    lon REAL,
    location_label TEXT,
    reputation REAL NOT NULL DEFAULT 3.0,
    total_swaps INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    price INTEGER,
    photo TEXT,
    lat REAL,
    lon REAL,
    location_label TEXT,
    views INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_items_browse ON items(category, status, id);
CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id);

CREATE TABLE IF NOT EXISTS item_views (
    item_id INTEGER NOT NULL,
    viewer_id INTEGER NOT NULL,
    viewed_at TEXT NOT NULL,

    PRIMARY KEY (item_id, viewer_id),
    FOREIGN KEY (item_id) REFERENCES items(id)
);

CREATE TABLE IF NOT EXISTS favorites (
    user_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, item_id),
    FOREIGN KEY (item_id) REFERENCES items(id)
);

CREATE TABLE IF NOT EXISTS proposals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    liked_item_id INTEGER NOT NULL,
    proposer_item_id INTEGER NOT NULL,
    proposer_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    message TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    responded_at TEXT,

    UNIQUE (liked_item_id, proposer_item_id),
    FOREIGN KEY (liked_item_id) REFERENCES items(id),
    FOREIGN KEY (proposer_item_id) REFERENCES items(id)
);

CREATE INDEX IF NOT EXISTS idx_proposals_target ON proposals(target_id, status);
CREATE INDEX IF NOT EXISTS idx_proposals_proposer ON proposals(proposer_id);

CREATE TABLE IF NOT EXISTS ratings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rater_id INTEGER NOT NULL,
    rated_id INTEGER NOT NULL,
    proposal_id INTEGER,
    score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
    comment TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (proposal_id) REFERENCES proposals(id)
);

-- NULL proposal ids would otherwise never collide under UNIQUE
CREATE UNIQUE INDEX IF NOT EXISTS idx_ratings_unique
    ON ratings(rater_id, rated_id, IFNULL(proposal_id, 0));
";

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub phone: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_label: Option<String>,
    /// Running average of received ratings
    pub reputation: f64,
    pub total_swaps: u64,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a posted item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Inactive,
    Deleted,
    PendingModeration,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Inactive => "inactive",
            ItemStatus::Deleted => "deleted",
            ItemStatus::PendingModeration => "pending_moderation",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ItemStatus::Active),
            "inactive" => Ok(ItemStatus::Inactive),
            "deleted" => Ok(ItemStatus::Deleted),
            "pending_moderation" => Ok(ItemStatus::PendingModeration),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// A posted good offered for swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: UserId,
    pub category: Category,
    pub title: String,
    pub description: String,
    /// `None` means free / no price
    pub price: Option<u64>,
    pub photo: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_label: Option<String>,
    pub views: u64,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

/// Fields collected by the posting flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub owner_id: UserId,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub price: Option<u64>,
    pub photo: Option<String>,
    pub location: Option<GeoPoint>,
    pub location_label: Option<String>,
}

/// Parameters for one candidate lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub category: Category,
    pub viewer_id: UserId,
    /// Last item handed out; only items sorting after it qualify.
    /// 0 means start of category.
    pub cursor: ItemId,
    pub origin: Option<GeoPoint>,
    pub max_distance_km: f64,
}

/// Status of a swap proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
    Cancelled,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Declined => "declined",
            ProposalStatus::Completed => "completed",
            ProposalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "accepted" => Ok(ProposalStatus::Accepted),
            "declined" => Ok(ProposalStatus::Declined),
            "completed" => Ok(ProposalStatus::Completed),
            "cancelled" => Ok(ProposalStatus::Cancelled),
            other => Err(format!("unknown proposal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProposal {
    pub liked_item_id: ItemId,
    pub proposer_item_id: ItemId,
    pub proposer_id: UserId,
    pub target_id: UserId,
    pub message: Option<String>,
}

/// Proposal joined with both item titles for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub liked_item_id: ItemId,
    pub liked_item_title: String,
    pub proposer_item_id: ItemId,
    pub proposer_item_title: String,
    pub proposer_id: UserId,
    pub target_id: UserId,
    pub message: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.proposer_id == user_id || self.target_id == user_id
    }

    /// The participant who is not `user_id`
    pub fn counterpart(&self, user_id: UserId) -> UserId {
        if self.proposer_id == user_id {
            self.target_id
        } else {
            self.proposer_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRating {
    pub rater_id: UserId,
    pub rated_id: UserId,
    pub score: u8,
    pub comment: Option<String>,
    pub proposal_id: Option<ProposalId>,
}

/// Profile fields a user may edit directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Name,
    Phone,
    LocationLabel,
}

impl UserField {
    pub fn column(self) -> &'static str {
        match self {
            UserField::Name => "display_name",
            UserField::Phone => "phone",
            UserField::LocationLabel => "location_label",
        }
    }
}
