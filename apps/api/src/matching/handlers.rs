use axum::{extract::State, Json};
use chrono::Utc;
use tracing::info;

use crate::candidates::repository::load_profiles_page;
use crate::errors::AppError;
use crate::matching::scoring::CandidateScore;
use crate::matching::search::{merge_ranked, rank_candidates, SearchRequest, SCORING_PAGE_SIZE};
use crate::state::AppState;

/// POST /api/v1/search
pub async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<CandidateScore>>, AppError> {
    let (requirements, limit) = req.into_parts()?;
    let snapshot = state.taxonomy.snapshot().await;
    let today = Utc::now().date_naive();

    let mut ranked = Vec::with_capacity(limit);
    let mut after = None;
    let mut scored = 0usize;
    loop {
        let page = load_profiles_page(
            &state.db,
            after,
            SCORING_PAGE_SIZE,
            &snapshot.certification_rules,
            today,
        )
        .await?;
        let Some(last) = page.last() else { break };
        after = Some(last.candidate_id);
        scored += page.len();

        let page_ranked = rank_candidates(&requirements, &page, &snapshot.categories, &state.weights, limit);
        merge_ranked(&mut ranked, page_ranked, limit);
        if (page.len() as i64) < SCORING_PAGE_SIZE {
            break;
        }
    }

    info!("Search scored {scored} candidates, returning {}", ranked.len());
    Ok(Json(ranked))
}
