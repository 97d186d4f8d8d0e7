use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Liveness plus the taxonomy snapshot currently being served.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.taxonomy.snapshot().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "talentmatch",
        "taxonomy_version": snapshot.version,
        "taxonomy_entries": snapshot.active_count()
    }))
}
