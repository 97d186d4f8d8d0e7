mod candidates;
mod config;
mod db;
mod embedding;
mod errors;
mod maintenance;
mod matching;
mod models;
mod resolver;
mod routes;
mod state;
mod taxonomy;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::embedding::{DisabledEmbeddings, EmbeddingClient, EmbeddingService};
use crate::matching::scoring::ScoringWeights;
use crate::resolver::ledger::{PgUnmatchedLedger, UnmatchedLedger};
use crate::resolver::TermResolver;
use crate::routes::build_router;
use crate::state::AppState;
use crate::taxonomy::cache::{spawn_refresh_loop, TaxonomyCache};
use crate::taxonomy::repository::PgTaxonomyRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TalentMatch API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Load the taxonomy snapshot
    let taxonomy = Arc::new(TaxonomyCache::load(Arc::new(PgTaxonomyRepository::new(db.clone()))).await?);
    let snapshot = taxonomy.snapshot().await;
    info!(
        "Taxonomy v{} loaded ({} active entries, {} categories, {} certification rules)",
        snapshot.version,
        snapshot.active_count(),
        snapshot.categories.len(),
        snapshot.certification_rules.len()
    );

    // Initialize embedding client; the semantic tier is skipped without one
    let embeddings: Arc<dyn EmbeddingService> = match &config.embedding_api_url {
        Some(url) => {
            let client = EmbeddingClient::new(
                url.clone(),
                config.embedding_api_key.clone(),
                config.embedding_model.clone(),
            )?;
            info!("Embedding client initialized (model: {})", client.model());
            Arc::new(client)
        }
        None => {
            warn!("EMBEDDING_API_URL not set; semantic resolution disabled");
            Arc::new(DisabledEmbeddings)
        }
    };

    let ledger: Arc<dyn UnmatchedLedger> = Arc::new(PgUnmatchedLedger::new(db.clone()));
    let resolver = Arc::new(TermResolver::new(&config.resolver, embeddings.clone(), ledger.clone()));

    // Background jobs
    spawn_refresh_loop(taxonomy.clone(), Duration::from_secs(config.taxonomy_refresh_secs));
    maintenance::spawn_backfill_loop(db.clone(), Duration::from_secs(config.experience_backfill_secs));

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        taxonomy,
        resolver,
        ledger,
        embeddings,
        weights: ScoringWeights::default(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
