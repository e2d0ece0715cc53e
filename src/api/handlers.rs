//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ErrorResponse, EventRequest, ItemsQuery, ItemsResponse, LocationRequest, ProfileResponse,
    ProposalsQuery, ProposalsResponse, RatingRequest, RatingResponse, RemovedResponse,
    SetActiveRequest, StatusRequest, UpdateUserRequest,
};
use super::AppState;
use crate::db::{Item, ItemId, NewRating, Proposal, ProposalId, ProposalStatus, User, UserId};
use crate::market::{ledger, profile, proposals, ErrorKind, MarketError};
use crate::runtime::{Notifier, StepOutcome};
use crate::state_machine::Outbound;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation engine
        .route("/api/users/:id/events", post(post_event))
        .route("/api/users/:id/notifications", get(stream_notifications))
        // Profile
        .route("/api/users/:id", get(get_profile).patch(update_profile))
        .route("/api/users/:id/location", put(update_location))
        // Items
        .route("/api/users/:id/items", get(list_user_items))
        .route("/api/items/:id/active", post(set_item_active))
        // Favorites
        .route("/api/users/:id/favorites", get(list_favorites))
        .route("/api/users/:id/favorites/:item_id", delete(remove_favorite))
        // Proposals and ratings
        .route("/api/users/:id/proposals/incoming", get(list_incoming))
        .route("/api/users/:id/proposals/outgoing", get(list_outgoing))
        .route("/api/proposals/:id/status", post(update_proposal_status))
        .route("/api/ratings", post(create_rating))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversation Engine
// ============================================================

async fn post_event(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<EventRequest>,
) -> Json<StepOutcome> {
    let display_name = req
        .display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("user {user_id}"));
    Json(state.engine.handle(user_id, &display_name, req.event).await)
}

async fn stream_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    tracing::info!(user_id, "Notification stream opened");
    let rx = state.hub.subscribe(user_id).await;
    sse_stream(user_id, rx)
}

// ============================================================
// Profile
// ============================================================

async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ProfileResponse>, AppError> {
    let repo = state.repo();
    let user = profile::profile(repo, user_id).await?;
    let active_items = profile::user_items(repo, user_id, true).await?.len();
    let pending_incoming = proposals::incoming(repo, user_id, Some(ProposalStatus::Pending))
        .await?
        .len();
    Ok(Json(ProfileResponse {
        user,
        active_items,
        pending_incoming,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = profile::update_field(state.repo(), user_id, req.field, &req.value).await?;
    Ok(Json(user))
}

async fn update_location(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<User>, AppError> {
    let user =
        profile::update_location(state.repo(), user_id, req.lat, req.lon, req.label.as_deref())
            .await?;
    Ok(Json(user))
}

// ============================================================
// Items and Favorites
// ============================================================

async fn list_user_items(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = profile::user_items(state.repo(), user_id, query.active_only).await?;
    Ok(Json(ItemsResponse { items }))
}

async fn set_item_active(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<Item>, AppError> {
    let item = profile::set_item_active(state.repo(), item_id, req.user_id, req.active).await?;
    Ok(Json(item))
}

async fn list_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = ledger::favorites(state.repo(), user_id).await?;
    Ok(Json(ItemsResponse { items }))
}

async fn remove_favorite(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(UserId, ItemId)>,
) -> Result<Json<RemovedResponse>, AppError> {
    ledger::remove_favorite(state.repo(), user_id, item_id).await?;
    Ok(Json(RemovedResponse { removed: item_id }))
}

// ============================================================
// Proposals and Ratings
// ============================================================

async fn list_incoming(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<ProposalsQuery>,
) -> Result<Json<ProposalsResponse>, AppError> {
    let proposals = proposals::incoming(state.repo(), user_id, query.status).await?;
    Ok(Json(ProposalsResponse { proposals }))
}

async fn list_outgoing(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ProposalsResponse>, AppError> {
    let proposals = proposals::outgoing(state.repo(), user_id).await?;
    Ok(Json(ProposalsResponse { proposals }))
}

async fn update_proposal_status(
    State(state): State<AppState>,
    Path(proposal_id): Path<ProposalId>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Proposal>, AppError> {
    let proposal = proposals::transition(state.repo(), proposal_id, req.actor_id, req.status).await?;

    // The write has committed; telling the other side is best-effort
    let counterpart = proposal.counterpart(req.actor_id);
    let message = Outbound::ProposalStatusChanged {
        proposal_id,
        status: proposal.status,
    };
    if let Err(e) = state.hub.deliver(counterpart, &message).await {
        tracing::warn!(user_id = counterpart, proposal_id, error = %e, "Notification not delivered");
    }
    Ok(Json(proposal))
}

async fn create_rating(
    State(state): State<AppState>,
    Json(req): Json<RatingRequest>,
) -> Result<Json<RatingResponse>, AppError> {
    let rating = NewRating {
        rater_id: req.rater_id,
        rated_id: req.rated_id,
        score: req.score,
        comment: req.comment,
        proposal_id: req.proposal_id,
    };
    let reputation = proposals::rate(state.repo(), &rating).await?;
    Ok(Json(RatingResponse {
        rated_id: rating.rated_id,
        reputation,
    }))
}

async fn get_version() -> impl IntoResponse {
    Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => AppError::BadRequest(message),
            ErrorKind::Forbidden => AppError::Forbidden(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::Repository => {
                tracing::error!(error = %message, "Request failed in storage");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorKind::Validation, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorKind::Forbidden, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorKind::NotFound, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorKind::Conflict, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Repository, msg),
        };

        let body = Json(ErrorResponse::new(message, Some(kind)));
        (status, body).into_response()
    }
}
