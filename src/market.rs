//! Stateless market services over the repository
//!
//! Candidate selection, the interaction ledger, the proposal and rating
//! lifecycle, and profile upkeep. Nothing here holds per-user state.

pub mod ledger;
pub mod profile;
pub mod proposals;
pub mod selector;

pub use ledger::FavoriteOutcome;
pub use proposals::{ProposeOutcome, ProposeRequest};
pub use selector::{BrowseFilters, PriceFilter};

use crate::catalog::ValidationError;
use crate::db::ProposalStatus;
use crate::runtime::RepoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Repository,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Cannot move proposal from {from} to {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },
    #[error("Storage failure: {0}")]
    Repository(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Validation(_) => ErrorKind::Validation,
            MarketError::Conflict(_) | MarketError::InvalidTransition { .. } => ErrorKind::Conflict,
            MarketError::NotFound(_) => ErrorKind::NotFound,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::Repository(_) => ErrorKind::Repository,
        }
    }
}

impl From<RepoError> for MarketError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => MarketError::NotFound(what),
            RepoError::Storage(msg) => MarketError::Repository(msg),
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
