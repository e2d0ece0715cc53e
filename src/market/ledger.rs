//! Interaction ledger: views and favorites

use super::{MarketError, MarketResult};
use crate::db::{Item, ItemId, UserId};
use crate::runtime::Repository;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteOutcome {
    Added,
    AlreadyPresent,
}

/// Record that `viewer_id` has been shown `item_id`.
///
/// At most one view per pair ever counts; returns whether this one did.
pub async fn record_view<R: Repository + ?Sized>(
    repo: &R,
    item_id: ItemId,
    viewer_id: UserId,
) -> MarketResult<bool> {
    let counted = repo.record_view(item_id, viewer_id).await?;
    tracing::debug!(item_id, viewer_id, counted, "Recorded view");
    Ok(counted)
}

pub async fn add_favorite<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    item_id: ItemId,
) -> MarketResult<FavoriteOutcome> {
    if repo.get_item(item_id).await?.is_none() {
        return Err(MarketError::NotFound(format!("Item {item_id} not found")));
    }
    let outcome = if repo.add_favorite(user_id, item_id).await? {
        FavoriteOutcome::Added
    } else {
        FavoriteOutcome::AlreadyPresent
    };
    Ok(outcome)
}

pub async fn remove_favorite<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    item_id: ItemId,
) -> MarketResult<()> {
    if repo.remove_favorite(user_id, item_id).await? {
        Ok(())
    } else {
        Err(MarketError::NotFound(format!(
            "Item {item_id} is not among the favorites"
        )))
    }
}

pub async fn favorites<R: Repository + ?Sized>(repo: &R, user_id: UserId) -> MarketResult<Vec<Item>> {
    Ok(repo.get_favorites(user_id).await?)
}
