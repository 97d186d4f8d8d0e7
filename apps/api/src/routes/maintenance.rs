use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::maintenance::{
    run_experience_backfill, run_re_resolve, run_taxonomy_embeddings, BackfillReport, EmbeddingReport,
    ReResolveReport,
};
use crate::state::AppState;

/// POST /api/v1/maintenance/experience-backfill
pub async fn handle_experience_backfill(
    State(state): State<AppState>,
) -> Result<Json<BackfillReport>, AppError> {
    Ok(Json(run_experience_backfill(&state.db).await?))
}

/// POST /api/v1/maintenance/re-resolve
pub async fn handle_re_resolve(State(state): State<AppState>) -> Result<Json<ReResolveReport>, AppError> {
    Ok(Json(run_re_resolve(&state.db, state.ledger.as_ref()).await?))
}

/// POST /api/v1/maintenance/taxonomy-embeddings
pub async fn handle_taxonomy_embeddings(
    State(state): State<AppState>,
) -> Result<Json<EmbeddingReport>, AppError> {
    let report = run_taxonomy_embeddings(&state.taxonomy, state.embeddings.as_ref()).await?;
    Ok(Json(report))
}
