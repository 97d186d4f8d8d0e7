use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::unmatched::UnmatchedItem;
use crate::models::vocabulary::ItemType;
use crate::resolver::ledger::LedgerFilter;
use crate::resolver::review::{review_item, ReviewRequest};
use crate::resolver::{Resolution, ResolveRequest};
use crate::state::AppState;

/// Hard ceiling for a single ledger listing.
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct ResolveBody {
    pub raw_term: String,
    pub item_type: ItemType,
    pub candidate_id: Option<Uuid>,
    pub correlation_id: Option<String>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub version: i64,
    pub active_entries: usize,
}

/// POST /api/v1/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Resolution>, AppError> {
    let snapshot = state.taxonomy.snapshot().await;
    let resolution = state
        .resolver
        .resolve(
            &snapshot,
            ResolveRequest {
                raw_term: &body.raw_term,
                item_type: body.item_type,
                candidate_id: body.candidate_id,
                correlation_id: body.correlation_id.as_deref(),
            },
        )
        .await?;
    Ok(Json(resolution))
}

/// GET /api/v1/unmatched
pub async fn handle_list_unmatched(
    State(state): State<AppState>,
    Query(mut filter): Query<LedgerFilter>,
) -> Result<Json<Vec<UnmatchedItem>>, AppError> {
    if let Some(limit) = filter.limit {
        if limit < 1 {
            return Err(AppError::Validation("limit must be at least 1".to_string()));
        }
        filter.limit = Some(limit.min(MAX_LIST_LIMIT));
    }
    let items = state.ledger.list(&filter).await?;
    Ok(Json(items))
}

/// POST /api/v1/unmatched/:id/review
pub async fn handle_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<UnmatchedItem>, AppError> {
    let item = review_item(state.ledger.as_ref(), &state.taxonomy, id, req).await?;
    Ok(Json(item))
}

/// POST /api/v1/taxonomy/refresh
pub async fn handle_taxonomy_refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    state.taxonomy.refresh().await?;
    let snapshot = state.taxonomy.snapshot().await;
    Ok(Json(RefreshResponse {
        version: snapshot.version,
        active_entries: snapshot.active_count(),
    }))
}
