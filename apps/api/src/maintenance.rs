//! Maintenance jobs: experience-duration backfill, applying reviewed ledger
//! decisions to candidate attribute records, and embedding taxonomy entries.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::candidates::repository::{backfill_durations, insert_attribute, AttributeInsert};
use crate::embedding::{embed_all, EmbeddingService};
use crate::errors::AppError;
use crate::models::unmatched::UnmatchedItem;
use crate::models::vocabulary::{ItemType, ResolutionMethod};
use crate::resolver::ledger::UnmatchedLedger;
use crate::taxonomy::cache::TaxonomyCache;

/// Confidence of an attribute established by human review.
pub const REVIEWED_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub intervals_updated: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReResolveReport {
    pub items_applied: usize,
    pub attributes_added: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingReport {
    pub entries_embedded: usize,
    pub taxonomy_version: i64,
}

pub async fn run_experience_backfill(pool: &PgPool) -> Result<BackfillReport> {
    let today = Utc::now().date_naive();
    let intervals_updated = backfill_durations(pool, today).await?;
    info!("Experience backfill updated {intervals_updated} interval durations");
    Ok(BackfillReport { intervals_updated })
}

pub fn spawn_backfill_loop(pool: PgPool, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = run_experience_backfill(&pool).await {
                warn!("Experience backfill failed: {e:?}");
            }
        }
    })
}

/// A reviewed decision ready to become a candidate attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApplication {
    pub item_id: Uuid,
    pub candidate_id: Uuid,
    pub taxonomy_id: Uuid,
    pub item_type: ItemType,
    pub raw_value: String,
}

pub fn pending_applications(items: &[UnmatchedItem]) -> Vec<PendingApplication> {
    items
        .iter()
        .filter(|i| i.applied_at.is_none())
        .filter_map(|i| {
            Some(PendingApplication {
                item_id: i.id,
                candidate_id: i.candidate_id?,
                taxonomy_id: i.resolved_taxonomy_id?,
                item_type: i.item_type,
                raw_value: i.raw_value.clone(),
            })
        })
        .collect()
}

/// Writes reviewed mappings/promotions onto the candidates they came from.
pub async fn run_re_resolve(pool: &PgPool, ledger: &dyn UnmatchedLedger) -> Result<ReResolveReport, AppError> {
    let items = ledger.reviewed_awaiting_application().await?;
    let applications = pending_applications(&items);

    let mut report = ReResolveReport::default();
    let mut applied = Vec::with_capacity(applications.len());
    for app in &applications {
        let added = insert_attribute(
            pool,
            &AttributeInsert {
                candidate_id: app.candidate_id,
                taxonomy_id: app.taxonomy_id,
                item_type: app.item_type,
                source_excerpt: Some(app.raw_value.as_str()),
                confidence: REVIEWED_CONFIDENCE,
                method: ResolutionMethod::Exact,
                verified: Some(true),
            },
        )
        .await?;
        if added {
            report.attributes_added += 1;
        }
        applied.push(app.item_id);
    }

    if !applied.is_empty() {
        ledger.mark_applied(&applied).await?;
    }
    report.items_applied = applied.len();
    info!(
        "Re-resolve applied {} reviewed items ({} new attribute records)",
        report.items_applied, report.attributes_added
    );
    Ok(report)
}

/// Embeds every active entry that has no vector yet, then reloads the cache.
pub async fn run_taxonomy_embeddings(
    taxonomy: &TaxonomyCache,
    embeddings: &dyn EmbeddingService,
) -> Result<EmbeddingReport, AppError> {
    let missing = taxonomy.repository().entries_missing_embeddings().await?;
    if missing.is_empty() {
        return Ok(EmbeddingReport {
            entries_embedded: 0,
            taxonomy_version: taxonomy.snapshot().await.version,
        });
    }

    let (ids, texts): (Vec<Uuid>, Vec<String>) = missing.into_iter().unzip();
    let vectors = embed_all(embeddings, &texts)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("embedding taxonomy entries failed: {e}")))?;

    let pairs: Vec<(Uuid, Vec<f32>)> = ids.into_iter().zip(vectors).collect();
    taxonomy.repository().store_embeddings(&pairs).await?;
    let version = taxonomy.refresh().await?;

    info!("Embedded {} taxonomy entries", pairs.len());
    Ok(EmbeddingReport {
        entries_embedded: pairs.len(),
        taxonomy_version: version,
    })
}
