//! Events that drive the conversation state machine

use crate::catalog::Category;
use crate::db::{Item, ItemId};
use crate::market::{BrowseFilters, ErrorKind, ProposeOutcome};
use serde::{Deserialize, Serialize};

/// Input arriving from the chat transport for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserInput {
    StartCreateItem,
    StartBrowse,
    MainMenu,
    Cancel,
    Back,
    Skip,
    Text { text: String },
    Category { category: Category },
    Photo { reference: String },
    /// Raw coordinates; range-checked by the flow
    Location { lat: f64, lon: f64 },
    Confirm { yes: bool },
    SetFilters { filters: BrowseFilters },
    /// Like the shown item and offer one of ours for it
    ProposeSwap,
    SelectOwnItem { item_id: ItemId },
    AddFavorite,
}

/// Events processed by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Input(UserInput),

    // Outcomes of effects the state machine requested
    CandidateFetched { item: Option<Item> },
    OwnItemsLoaded { items: Vec<Item> },
    ItemCreated { item_id: ItemId },
    ProposalSubmitted { outcome: ProposeOutcome },
    FavoriteAdded { newly: bool },
    OperationFailed { kind: ErrorKind, message: String },
}

impl Event {
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::OperationFailed { .. })
    }
}

impl From<UserInput> for Event {
    fn from(input: UserInput) -> Self {
        Event::Input(input)
    }
}
