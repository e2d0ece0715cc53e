//! Candidate selection for browsing
//!
//! The repository answers one "next item after the cursor" query; this
//! module adds the single wrap-around retry and the post-fetch filters.

use super::MarketResult;
use crate::db::{CandidateQuery, Item};
use crate::runtime::Repository;
use serde::{Deserialize, Serialize};

/// Price constraint chosen by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum PriceFilter {
    #[default]
    Any,
    /// Only items without a price
    FreeOnly,
    AtMost(u64),
    AtLeast(u64),
}

/// Filters snapshotted when browsing starts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrowseFilters {
    /// Overrides the configured search radius
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub price: PriceFilter,
    #[serde(default)]
    pub photo_only: bool,
}

impl BrowseFilters {
    /// Whether an already fetched candidate passes the price and photo filters
    pub fn matches(&self, item: &Item) -> bool {
        if self.photo_only && item.photo.is_none() {
            return false;
        }
        match (self.price, item.price) {
            (PriceFilter::Any, _) | (PriceFilter::FreeOnly, None) => true,
            (PriceFilter::FreeOnly, Some(_)) => false,
            // An unpriced item is free, so it fits any ceiling
            (PriceFilter::AtMost(_), None) => true,
            (PriceFilter::AtMost(max), Some(price)) => price <= max,
            (PriceFilter::AtLeast(_), None) => false,
            (PriceFilter::AtLeast(min), Some(price)) => price >= min,
        }
    }
}

/// Next candidate after `query.cursor`, restarting once from the start of
/// the category when nothing lies past the cursor.
pub async fn next_candidate<R: Repository + ?Sized>(
    repo: &R,
    query: &CandidateQuery,
) -> MarketResult<Option<Item>> {
    if let Some(item) = repo.next_candidate(query).await? {
        return Ok(Some(item));
    }
    if query.cursor == 0 {
        return Ok(None);
    }

    tracing::debug!(
        viewer_id = query.viewer_id,
        category = %query.category,
        cursor = query.cursor,
        "Candidate search wrapped to start of category"
    );
    let restart = CandidateQuery { cursor: 0, ..*query };
    Ok(repo.next_candidate(&restart).await?)
}
