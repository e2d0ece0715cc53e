//! Effects produced by state transitions

use crate::catalog::{Category, ValidationError};
use crate::db::{CandidateQuery, Item, ItemId, NewItem, ProposalId, ProposalStatus, UserId};
use crate::market::{BrowseFilters, ProposeRequest};
use serde::{Deserialize, Serialize};

use super::state::ItemDraft;

/// Semantic message for a user; rendering belongs to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    MainMenu,
    Cancelled,
    /// A repository call is still in flight
    StillWorking,
    InvalidInput {
        error: ValidationError,
    },

    // Create-Item prompts
    ChooseCategory {
        categories: Vec<Category>,
    },
    EnterTitle {
        max_len: usize,
        current: Option<String>,
    },
    EnterDescription {
        max_len: usize,
        current: Option<String>,
    },
    EnterPrice {
        current: Option<u64>,
    },
    SendPhoto,
    ShareLocation,
    ConfirmItem {
        draft: ItemDraft,
    },
    ItemCreated {
        item_id: ItemId,
    },

    // Browse
    ChooseBrowseCategory {
        categories: Vec<Category>,
        filters: BrowseFilters,
    },
    FiltersUpdated {
        filters: BrowseFilters,
    },
    ShowItem {
        item: Item,
    },
    NoMoreItems,
    ChooseOwnItem {
        liked_item_id: ItemId,
        options: Vec<Item>,
    },
    NoEligibleItems {
        category: Category,
    },
    ProposalSent {
        proposal_id: ProposalId,
    },
    AlreadyProposed,
    FavoriteAdded,
    AlreadyFavorite,

    // Failures
    NotFound {
        message: String,
    },
    Failure {
        message: String,
    },

    // Notifications to other users
    SwapProposed {
        proposal_id: ProposalId,
        liked_item_id: ItemId,
        proposer_item_id: ItemId,
        proposer_id: UserId,
    },
    ProposalStatusChanged {
        proposal_id: ProposalId,
        status: ProposalStatus,
    },
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Reply to the user who sent the event
    Reply(Outbound),

    /// Best-effort message to another user
    Notify { user_id: UserId, message: Outbound },

    FetchCandidate(CandidateQuery),

    RecordView { item_id: ItemId },

    /// Load the user's active items in one category
    LoadOwnItems { category: Category },

    CreateItem(NewItem),

    SubmitProposal(ProposeRequest),

    AddFavorite { item_id: ItemId },
}

impl Effect {
    pub fn reply(message: Outbound) -> Self {
        Effect::Reply(message)
    }

    pub fn invalid(error: ValidationError) -> Self {
        Effect::Reply(Outbound::InvalidInput { error })
    }
}
