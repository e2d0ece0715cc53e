//! Profile and item management outside the guided flows

use super::{MarketError, MarketResult};
use crate::catalog::{self, ValidationError};
use crate::db::{Item, ItemId, User, UserField, UserId};
use crate::geo::GeoPoint;
use crate::runtime::Repository;

pub async fn profile<R: Repository + ?Sized>(repo: &R, user_id: UserId) -> MarketResult<User> {
    repo.get_user(user_id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("User {user_id} not found")))
}

/// Save a location; without a label the coordinates become the label
pub async fn update_location<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    lat: f64,
    lon: f64,
    label: Option<&str>,
) -> MarketResult<User> {
    let point = GeoPoint::new(lat, lon).ok_or(ValidationError::InvalidCoordinates)?;
    let label = match label {
        Some(label) => catalog::validate_text(label, catalog::MAX_NAME_LEN)?,
        None => point.label(),
    };
    repo.update_user_location(user_id, point, &label).await?;
    profile(repo, user_id).await
}

pub async fn update_field<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    field: UserField,
    value: &str,
) -> MarketResult<User> {
    let value = match field {
        UserField::Name => catalog::validate_name(value)?,
        UserField::Phone => catalog::validate_phone(value)?,
        UserField::LocationLabel => catalog::validate_text(value, catalog::MAX_NAME_LEN)?,
    };
    repo.update_user_field(user_id, field, &value).await?;
    profile(repo, user_id).await
}

pub async fn user_items<R: Repository + ?Sized>(
    repo: &R,
    user_id: UserId,
    active_only: bool,
) -> MarketResult<Vec<Item>> {
    Ok(repo.get_user_items(user_id, active_only).await?)
}

/// Hide or re-list an item; only its owner may do either
pub async fn set_item_active<R: Repository + ?Sized>(
    repo: &R,
    item_id: ItemId,
    actor: UserId,
    active: bool,
) -> MarketResult<Item> {
    let item = repo
        .get_item(item_id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Item {item_id} not found")))?;
    if item.owner_id != actor {
        return Err(MarketError::Forbidden(format!(
            "Item {item_id} belongs to someone else"
        )));
    }
    repo.set_item_active(item_id, active).await?;
    tracing::info!(item_id, actor, active, "Item visibility changed");
    repo.get_item(item_id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Item {item_id} not found")))
}
