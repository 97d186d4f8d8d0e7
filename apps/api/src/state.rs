use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::matching::scoring::ScoringWeights;
use crate::resolver::ledger::UnmatchedLedger;
use crate::resolver::TermResolver;
use crate::taxonomy::cache::TaxonomyCache;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Read-mostly taxonomy snapshot, swapped on refresh.
    pub taxonomy: Arc<TaxonomyCache>,
    pub resolver: Arc<TermResolver>,
    pub ledger: Arc<dyn UnmatchedLedger>,
    /// `DisabledEmbeddings` when no embedding API is configured.
    pub embeddings: Arc<dyn EmbeddingService>,
    pub weights: ScoringWeights,
}
