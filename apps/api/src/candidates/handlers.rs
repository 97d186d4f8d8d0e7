use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidates::aggregate::CandidateProfile;
use crate::candidates::dedup::{find_similar, SimilarCandidate, SimilarityQuery};
use crate::candidates::ingest::{ingest_attributes, IngestReport, IngestRequest};
use crate::candidates::repository::{get_candidate, insert_candidate, list_candidates, load_profile, NewCandidate};
use crate::errors::AppError;
use crate::models::candidate::CandidateRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterCandidateRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterCandidateResponse {
    pub candidate: CandidateRow,
    pub possible_duplicates: Vec<SimilarCandidate>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// POST /api/v1/candidates
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterCandidateRequest>,
) -> Result<(StatusCode, Json<RegisterCandidateResponse>), AppError> {
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation("first_name and last_name are required".to_string()));
    }

    let existing = list_candidates(&state.db).await?;
    let possible_duplicates = find_similar(
        &existing,
        &SimilarityQuery {
            email: req.email.clone(),
            phone: req.phone.clone(),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            threshold: None,
        },
    );

    let candidate = insert_candidate(
        &state.db,
        &NewCandidate {
            first_name,
            last_name,
            email: non_blank(&req.email),
            phone: non_blank(&req.phone),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterCandidateResponse {
            candidate,
            possible_duplicates,
        }),
    ))
}

/// POST /api/v1/candidates/:id/attributes
pub async fn handle_ingest_attributes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    if get_candidate(&state.db, id).await?.is_none() {
        return Err(AppError::NotFound(format!("Candidate {id} not found")));
    }
    let snapshot = state.taxonomy.snapshot().await;
    let report = ingest_attributes(&state.db, &state.resolver, &snapshot, id, &req).await?;
    Ok(Json(report))
}

/// GET /api/v1/candidates/:id/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CandidateProfile>, AppError> {
    let snapshot = state.taxonomy.snapshot().await;
    let today = Utc::now().date_naive();
    let profile = load_profile(&state.db, id, &snapshot.certification_rules, today)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    Ok(Json(profile))
}

/// POST /api/v1/candidates/similar
pub async fn handle_find_similar(
    State(state): State<AppState>,
    Json(query): Json<SimilarityQuery>,
) -> Result<Json<Vec<SimilarCandidate>>, AppError> {
    if let Some(t) = query.threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::Validation("threshold must be between 0 and 1".to_string()));
        }
    }
    let candidates = list_candidates(&state.db).await?;
    Ok(Json(find_similar(&candidates, &query)))
}
