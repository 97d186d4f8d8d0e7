//! Human review of ledger items. A decision first claims the item out of
//! `pending`, then mutates the taxonomy (map adds the raw value as an alias,
//! promote creates a new entry); a failed taxonomy write returns the item to
//! `pending`. Existing candidate attribute records are untouched; the
//! re-resolve maintenance batch applies decisions to them.

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::unmatched::UnmatchedItem;
use crate::models::vocabulary::ReviewStatus;
use crate::resolver::ledger::{ReviewTransition, UnmatchedLedger};
use crate::taxonomy::cache::TaxonomyCache;
use crate::taxonomy::normalize::normalize_term;
use crate::taxonomy::repository::NewTaxonomyEntry;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    MapToExisting {
        taxonomy_id: Uuid,
    },
    PromoteToNewEntry {
        name_en: String,
        #[serde(default)]
        name_el: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },
    Reject,
    MarkDuplicate {
        #[serde(default)]
        of_item_id: Option<Uuid>,
    },
}

impl ReviewDecision {
    fn target_status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::MapToExisting { .. } => ReviewStatus::Mapped,
            ReviewDecision::PromoteToNewEntry { .. } => ReviewStatus::Promoted,
            ReviewDecision::Reject => ReviewStatus::Rejected,
            ReviewDecision::MarkDuplicate { .. } => ReviewStatus::Duplicate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub note: Option<String>,
}

/// Taxonomy write a decision needs, performed only after the item is claimed.
enum TaxonomyChange {
    None,
    Alias { taxonomy_id: Uuid, alias: String },
    Create(NewTaxonomyEntry),
}

pub async fn review_item(
    ledger: &dyn UnmatchedLedger,
    taxonomy: &TaxonomyCache,
    item_id: Uuid,
    request: ReviewRequest,
) -> Result<UnmatchedItem, AppError> {
    let item = ledger
        .get(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unmatched item {item_id} not found")))?;
    if item.status != ReviewStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Unmatched item {item_id} was already reviewed ({})",
            item.status
        )));
    }

    let status = request.decision.target_status();
    let mut transition = ReviewTransition {
        status,
        resolved_taxonomy_id: None,
        duplicate_of: None,
        note: request.note,
    };
    let mut change = TaxonomyChange::None;

    match request.decision {
        ReviewDecision::MapToExisting { taxonomy_id } => {
            let snapshot = taxonomy.snapshot().await;
            let target = snapshot
                .entry(taxonomy_id)
                .ok_or_else(|| AppError::NotFound(format!("Taxonomy entry {taxonomy_id} not found")))?;
            if target.item_type != item.item_type {
                return Err(AppError::Validation(format!(
                    "Cannot map a {} term onto {} entry '{}'",
                    item.item_type, target.item_type, target.name_en
                )));
            }
            let already_known = target
                .match_terms()
                .any(|t| normalize_term(t) == item.normalized_value);
            if !already_known {
                change = TaxonomyChange::Alias {
                    taxonomy_id,
                    alias: item.raw_value.clone(),
                };
            }
            transition.resolved_taxonomy_id = Some(taxonomy_id);
        }
        ReviewDecision::PromoteToNewEntry {
            name_en,
            name_el,
            category,
        } => {
            let name_en = name_en.trim().to_string();
            if name_en.is_empty() {
                return Err(AppError::Validation("name_en cannot be empty".to_string()));
            }
            let normalized_name = normalize_term(&name_en);
            let snapshot = taxonomy.snapshot().await;
            if let Some(existing) = snapshot
                .entries()
                .iter()
                .find(|e| e.item_type == item.item_type && normalize_term(&e.name_en) == normalized_name)
            {
                return Err(AppError::Conflict(format!(
                    "A {} entry named '{}' already exists ({}); map to it instead",
                    item.item_type, existing.name_en, existing.id
                )));
            }
            let mut exact_aliases = Vec::new();
            if normalized_name != item.normalized_value {
                exact_aliases.push(item.raw_value.clone());
            }
            let id = Uuid::new_v4();
            change = TaxonomyChange::Create(NewTaxonomyEntry {
                id,
                item_type: item.item_type,
                name_en,
                name_el: name_el.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                exact_aliases,
                category,
            });
            transition.resolved_taxonomy_id = Some(id);
        }
        ReviewDecision::Reject => {}
        ReviewDecision::MarkDuplicate { of_item_id } => {
            if let Some(original) = of_item_id {
                if original == item_id {
                    return Err(AppError::Validation("An item cannot duplicate itself".to_string()));
                }
                if ledger.get(original).await?.is_none() {
                    return Err(AppError::NotFound(format!("Unmatched item {original} not found")));
                }
            }
            transition.duplicate_of = of_item_id;
        }
    }

    // The claim precedes every taxonomy write.
    let reviewed = ledger.apply_review(item_id, transition).await?.ok_or_else(|| {
        AppError::Conflict(format!("Unmatched item {item_id} was reviewed concurrently"))
    })?;

    let written = match change {
        TaxonomyChange::None => None,
        TaxonomyChange::Alias { taxonomy_id, alias } => Some(
            taxonomy
                .repository()
                .add_alias(taxonomy_id, &alias)
                .await
                .map(|found| {
                    found
                        .then_some(())
                        .ok_or_else(|| AppError::NotFound(format!("Taxonomy entry {taxonomy_id} not found")))
                }),
        ),
        TaxonomyChange::Create(entry) => {
            let name = entry.name_en.clone();
            let item_type = entry.item_type;
            Some(taxonomy.repository().create_entry(entry).await.map(|created| {
                created.then_some(()).ok_or_else(|| {
                    AppError::Conflict(format!("A {item_type} entry named '{name}' already exists"))
                })
            }))
        }
    };

    if let Some(outcome) = written {
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => Some(AppError::from(e)),
        };
        if let Some(err) = failure {
            release_claim(ledger, item_id, status).await;
            return Err(err);
        }
        if let Err(e) = taxonomy.refresh().await {
            // The periodic refresh loop will pick the change up.
            warn!("Taxonomy refresh after review of {item_id} failed: {e:?}");
        }
    }

    info!(
        "Reviewed unmatched item {item_id} ('{}', {}) as {status}",
        reviewed.raw_value, reviewed.item_type
    );
    Ok(reviewed)
}

async fn release_claim(ledger: &dyn UnmatchedLedger, item_id: Uuid, status: ReviewStatus) {
    match ledger.reopen(item_id, status).await {
        Ok(true) => info!("Returned unmatched item {item_id} to pending after a failed taxonomy write"),
        Ok(false) => warn!("Unmatched item {item_id} could not be returned to pending; it stays {status}"),
        Err(e) => warn!("Failed to return unmatched item {item_id} to pending: {e:?}"),
    }
}
