//! Swap proposals and ratings
//!
//! Proposal lifecycle:
//!
//! ```text
//! pending --> accepted --> completed
//!    |            |
//!    v            v
//! declined    cancelled
//! ```
//!
//! Uniqueness of the (liked, offered) pair and the status compare-and-set
//! both live in the repository, so concurrent callers cannot produce two
//! rows or skip a state.

use super::{MarketError, MarketResult};
use crate::catalog::validate_score;
use crate::db::{
    ItemId, NewProposal, NewRating, Proposal, ProposalId, ProposalStatus, UserId,
};
use crate::runtime::Repository;
use serde::{Deserialize, Serialize};

impl ProposalStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::{Accepted, Cancelled, Completed, Declined, Pending};
        matches!(
            (self, next),
            (Pending, Accepted | Declined) | (Accepted, Completed | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalStatus::Declined | ProposalStatus::Completed | ProposalStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeRequest {
    pub liked_item_id: ItemId,
    pub proposer_item_id: ItemId,
    pub proposer_id: UserId,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposeOutcome {
    Created {
        proposal_id: ProposalId,
        target_id: UserId,
    },
    AlreadyExists,
}

/// Offer `proposer_item_id` in exchange for `liked_item_id`.
///
/// The target user is the owner of the liked item.
pub async fn propose<R: Repository + ?Sized>(
    repo: &R,
    request: &ProposeRequest,
) -> MarketResult<ProposeOutcome> {
    let liked = repo
        .get_item(request.liked_item_id)
        .await?
        .filter(|item| item.is_active())
        .ok_or_else(|| {
            MarketError::NotFound(format!("Item {} is no longer available", request.liked_item_id))
        })?;
    if liked.owner_id == request.proposer_id {
        return Err(MarketError::Forbidden(
            "Cannot propose a swap for your own item".to_string(),
        ));
    }

    let offered = repo
        .get_item(request.proposer_item_id)
        .await?
        .filter(|item| item.is_active())
        .ok_or_else(|| {
            MarketError::NotFound(format!("Item {} is no longer available", request.proposer_item_id))
        })?;
    if offered.owner_id != request.proposer_id {
        return Err(MarketError::Forbidden(
            "Offered item belongs to someone else".to_string(),
        ));
    }
    if offered.category != liked.category {
        return Err(MarketError::Forbidden(format!(
            "Offered item must be in the {} category",
            liked.category
        )));
    }

    let created = repo
        .create_proposal(&NewProposal {
            liked_item_id: liked.id,
            proposer_item_id: offered.id,
            proposer_id: request.proposer_id,
            target_id: liked.owner_id,
            message: request.message.clone(),
        })
        .await?;

    match created {
        Some(proposal_id) => {
            tracing::info!(
                proposal_id,
                liked_item_id = liked.id,
                proposer_item_id = offered.id,
                proposer_id = request.proposer_id,
                target_id = liked.owner_id,
                "Swap proposed"
            );
            Ok(ProposeOutcome::Created {
                proposal_id,
                target_id: liked.owner_id,
            })
        }
        None => Ok(ProposeOutcome::AlreadyExists),
    }
}

/// Move a proposal to `to` on behalf of `actor`.
///
/// Only the target may accept or decline; either participant may complete
/// or cancel an accepted proposal.
pub async fn transition<R: Repository + ?Sized>(
    repo: &R,
    proposal_id: ProposalId,
    actor: UserId,
    to: ProposalStatus,
) -> MarketResult<Proposal> {
    let proposal = load(repo, proposal_id).await?;
    if !proposal.involves(actor) {
        return Err(MarketError::Forbidden(format!(
            "User {actor} is not part of proposal {proposal_id}"
        )));
    }
    let from = proposal.status;
    if from.is_terminal() {
        return Err(MarketError::Conflict(format!(
            "Proposal {proposal_id} is already {from}"
        )));
    }
    if !from.can_transition_to(to) {
        return Err(MarketError::InvalidTransition { from, to });
    }
    if matches!(to, ProposalStatus::Accepted | ProposalStatus::Declined)
        && actor != proposal.target_id
    {
        return Err(MarketError::Forbidden(
            "Only the owner of the requested item can answer".to_string(),
        ));
    }

    if !repo.update_proposal_status(proposal_id, from, to).await? {
        return Err(MarketError::Conflict(format!(
            "Proposal {proposal_id} changed while updating"
        )));
    }
    tracing::info!(proposal_id, actor, %from, %to, "Proposal status changed");
    load(repo, proposal_id).await
}

pub async fn incoming<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    status: Option<ProposalStatus>,
) -> MarketResult<Vec<Proposal>> {
    Ok(repo.get_incoming_proposals(user_id, status).await?)
}

pub async fn outgoing<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
) -> MarketResult<Vec<Proposal>> {
    Ok(repo.get_outgoing_proposals(user_id).await?)
}

/// Rate another user; returns their new average.
///
/// A rating tied to a proposal requires it to be completed and both users
/// to be its participants.
pub async fn rate<R: Repository + ?Sized>(repo: &R, rating: &NewRating) -> MarketResult<f64> {
    validate_score(rating.score)?;
    if rating.rater_id == rating.rated_id {
        return Err(MarketError::Forbidden("Cannot rate yourself".to_string()));
    }
    if let Some(proposal_id) = rating.proposal_id {
        let proposal = load(repo, proposal_id).await?;
        if proposal.status != ProposalStatus::Completed {
            return Err(MarketError::Forbidden(
                "Only completed swaps can be rated".to_string(),
            ));
        }
        if !proposal.involves(rating.rater_id)
            || proposal.counterpart(rating.rater_id) != rating.rated_id
        {
            return Err(MarketError::Forbidden(
                "Ratings must be between the swap participants".to_string(),
            ));
        }
    }

    match repo.add_rating(rating).await? {
        Some(average) => Ok(average),
        None => Err(MarketError::Conflict("You have already rated this user".to_string())),
    }
}

async fn load<R: Repository + ?Sized>(repo: &R, id: ProposalId) -> MarketResult<Proposal> {
    repo.get_proposal(id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Proposal {id} not found")))
}
