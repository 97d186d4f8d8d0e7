//! Unmatched-item ledger: durable, never-deleted record of terms the resolver
//! could not confidently place.
//!
//! Pending rows are unique per (candidate, item type, normalized value); a
//! recurrence increments `occurrence_count` atomically instead of inserting.
//! Reviewed rows leave that key free, so a later recurrence opens a new
//! pending row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::unmatched::{UnmatchedItem, UnmatchedItemRow};
use crate::models::vocabulary::{ItemType, LedgerOutcome, ResolutionMethod, ReviewStatus};

/// What the resolver hands the ledger for one non-trusted outcome.
#[derive(Debug, Clone)]
pub struct LedgerRecord<'a> {
    pub candidate_id: Option<Uuid>,
    pub correlation_id: Option<&'a str>,
    pub item_type: ItemType,
    pub raw_value: &'a str,
    pub normalized_value: &'a str,
    pub suggested_taxonomy_id: Option<Uuid>,
    pub similarity: Option<f64>,
    pub method: ResolutionMethod,
    pub outcome: LedgerOutcome,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerFilter {
    pub status: Option<ReviewStatus>,
    pub item_type: Option<ItemType>,
    pub candidate_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// A review transition, applied only while the item is still pending.
#[derive(Debug, Clone)]
pub struct ReviewTransition {
    pub status: ReviewStatus,
    pub resolved_taxonomy_id: Option<Uuid>,
    pub duplicate_of: Option<Uuid>,
    pub note: Option<String>,
}

pub const DEFAULT_LIST_LIMIT: i64 = 100;

#[async_trait]
pub trait UnmatchedLedger: Send + Sync {
    async fn upsert(&self, record: LedgerRecord<'_>) -> Result<UnmatchedItem>;

    async fn get(&self, id: Uuid) -> Result<Option<UnmatchedItem>>;

    async fn list(&self, filter: &LedgerFilter) -> Result<Vec<UnmatchedItem>>;

    /// Moves a pending item to a reviewed status. `None` when the item is
    /// missing or no longer pending.
    async fn apply_review(&self, id: Uuid, transition: ReviewTransition) -> Result<Option<UnmatchedItem>>;

    /// Returns a reviewed item to `pending` after its taxonomy change failed.
    /// False when the item left `status` meanwhile or its pending key was
    /// taken by a newer recurrence.
    async fn reopen(&self, id: Uuid, status: ReviewStatus) -> Result<bool>;

    /// Mapped or promoted items tied to a candidate whose decision has not yet
    /// been written to candidate attribute records.
    async fn reviewed_awaiting_application(&self) -> Result<Vec<UnmatchedItem>>;

    async fn mark_applied(&self, ids: &[Uuid]) -> Result<()>;
}

pub struct PgUnmatchedLedger {
    pool: PgPool,
}

impl PgUnmatchedLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_items(rows: Vec<UnmatchedItemRow>) -> Result<Vec<UnmatchedItem>> {
    rows.into_iter()
        .map(|row| UnmatchedItem::try_from(row).context("unmatched_items holds an unknown vocabulary value"))
        .collect()
}

#[async_trait]
impl UnmatchedLedger for PgUnmatchedLedger {
    async fn upsert(&self, record: LedgerRecord<'_>) -> Result<UnmatchedItem> {
        let row = sqlx::query_as::<_, UnmatchedItemRow>(
            r#"
            INSERT INTO unmatched_items
                (candidate_id, correlation_id, item_type, raw_value, normalized_value,
                 suggested_taxonomy_id, similarity, resolution_method, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ((COALESCE(candidate_id, '00000000-0000-0000-0000-000000000000'::uuid)),
                         item_type, normalized_value)
                WHERE status = 'pending'
            DO UPDATE SET
                occurrence_count = unmatched_items.occurrence_count + 1,
                last_seen_at = now(),
                correlation_id = COALESCE(EXCLUDED.correlation_id, unmatched_items.correlation_id),
                suggested_taxonomy_id = COALESCE(EXCLUDED.suggested_taxonomy_id, unmatched_items.suggested_taxonomy_id),
                similarity = COALESCE(EXCLUDED.similarity, unmatched_items.similarity),
                resolution_method = EXCLUDED.resolution_method,
                outcome = EXCLUDED.outcome
            RETURNING *
            "#,
        )
        .bind(record.candidate_id)
        .bind(record.correlation_id)
        .bind(record.item_type.as_str())
        .bind(record.raw_value)
        .bind(record.normalized_value)
        .bind(record.suggested_taxonomy_id)
        .bind(record.similarity)
        .bind(record.method.as_str())
        .bind(record.outcome.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(UnmatchedItem::try_from(row)?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<UnmatchedItem>> {
        let row = sqlx::query_as::<_, UnmatchedItemRow>("SELECT * FROM unmatched_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UnmatchedItem::try_from).transpose()?)
    }

    async fn list(&self, filter: &LedgerFilter) -> Result<Vec<UnmatchedItem>> {
        let rows = sqlx::query_as::<_, UnmatchedItemRow>(
            r#"
            SELECT * FROM unmatched_items
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR item_type = $2)
              AND ($3::uuid IS NULL OR candidate_id = $3)
            ORDER BY occurrence_count DESC, last_seen_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.item_type.map(|t| t.as_str()))
        .bind(filter.candidate_id)
        .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .fetch_all(&self.pool)
        .await?;
        into_items(rows)
    }

    async fn apply_review(&self, id: Uuid, transition: ReviewTransition) -> Result<Option<UnmatchedItem>> {
        let row = sqlx::query_as::<_, UnmatchedItemRow>(
            r#"
            UPDATE unmatched_items
            SET status = $2,
                resolved_taxonomy_id = $3,
                duplicate_of = $4,
                review_note = $5,
                reviewed_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.status.as_str())
        .bind(transition.resolved_taxonomy_id)
        .bind(transition.duplicate_of)
        .bind(transition.note)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UnmatchedItem::try_from).transpose()?)
    }

    async fn reopen(&self, id: Uuid, status: ReviewStatus) -> Result<bool> {
        let reopened = sqlx::query(
            r#"
            UPDATE unmatched_items u
            SET status = 'pending',
                resolved_taxonomy_id = NULL,
                duplicate_of = NULL,
                review_note = NULL,
                reviewed_at = NULL
            WHERE u.id = $1
              AND u.status = $2
              AND NOT EXISTS (
                  SELECT 1 FROM unmatched_items p
                  WHERE p.status = 'pending'
                    AND p.candidate_id IS NOT DISTINCT FROM u.candidate_id
                    AND p.item_type = u.item_type
                    AND p.normalized_value = u.normalized_value
              )
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(reopened > 0)
    }

    async fn reviewed_awaiting_application(&self) -> Result<Vec<UnmatchedItem>> {
        let rows = sqlx::query_as::<_, UnmatchedItemRow>(
            r#"
            SELECT u.* FROM unmatched_items u
            JOIN taxonomy_entries t ON t.id = u.resolved_taxonomy_id
            WHERE u.status IN ('mapped', 'promoted')
              AND u.candidate_id IS NOT NULL
              AND u.applied_at IS NULL
            ORDER BY u.reviewed_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        into_items(rows)
    }

    async fn mark_applied(&self, ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE unmatched_items SET applied_at = now() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    /// In-memory ledger with the same pending-key semantics as the Postgres one.
    #[derive(Default)]
    pub struct InMemoryLedger {
        items: Mutex<Vec<UnmatchedItem>>,
    }

    impl InMemoryLedger {
        pub fn all(&self) -> Vec<UnmatchedItem> {
            self.items.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UnmatchedLedger for InMemoryLedger {
        async fn upsert(&self, record: LedgerRecord<'_>) -> Result<UnmatchedItem> {
            let mut items = self.items.lock().unwrap();
            let existing = items.iter_mut().find(|i| {
                i.status == ReviewStatus::Pending
                    && i.candidate_id == record.candidate_id
                    && i.item_type == record.item_type
                    && i.normalized_value == record.normalized_value
            });
            if let Some(item) = existing {
                item.occurrence_count += 1;
                item.last_seen_at = Utc::now();
                item.suggested_taxonomy_id = record.suggested_taxonomy_id.or(item.suggested_taxonomy_id);
                item.similarity = record.similarity.or(item.similarity);
                item.resolution_method = record.method;
                item.outcome = record.outcome;
                return Ok(item.clone());
            }
            let now = Utc::now();
            let item = UnmatchedItem {
                id: Uuid::new_v4(),
                candidate_id: record.candidate_id,
                correlation_id: record.correlation_id.map(String::from),
                item_type: record.item_type,
                raw_value: record.raw_value.to_string(),
                normalized_value: record.normalized_value.to_string(),
                suggested_taxonomy_id: record.suggested_taxonomy_id,
                similarity: record.similarity,
                resolution_method: record.method,
                outcome: record.outcome,
                status: ReviewStatus::Pending,
                occurrence_count: 1,
                resolved_taxonomy_id: None,
                duplicate_of: None,
                review_note: None,
                reviewed_at: None,
                applied_at: None,
                first_seen_at: now,
                last_seen_at: now,
            };
            items.push(item.clone());
            Ok(item)
        }

        async fn get(&self, id: Uuid) -> Result<Option<UnmatchedItem>> {
            Ok(self.items.lock().unwrap().iter().find(|i| i.id == id).cloned())
        }

        async fn list(&self, filter: &LedgerFilter) -> Result<Vec<UnmatchedItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| filter.status.map_or(true, |s| i.status == s))
                .filter(|i| filter.item_type.map_or(true, |t| i.item_type == t))
                .filter(|i| filter.candidate_id.map_or(true, |c| i.candidate_id == Some(c)))
                .take(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize)
                .cloned()
                .collect())
        }

        async fn apply_review(&self, id: Uuid, transition: ReviewTransition) -> Result<Option<UnmatchedItem>> {
            let mut items = self.items.lock().unwrap();
            let target = items
                .iter_mut()
                .find(|i| i.id == id && i.status == ReviewStatus::Pending);
            Ok(target.map(|item| {
                item.status = transition.status;
                item.resolved_taxonomy_id = transition.resolved_taxonomy_id;
                item.duplicate_of = transition.duplicate_of;
                item.review_note = transition.note;
                item.reviewed_at = Some(Utc::now());
                item.clone()
            }))
        }

        async fn reopen(&self, id: Uuid, status: ReviewStatus) -> Result<bool> {
            let mut items = self.items.lock().unwrap();
            let Some(pos) = items.iter().position(|i| i.id == id && i.status == status) else {
                return Ok(false);
            };
            let key_taken = items.iter().any(|p| {
                p.status == ReviewStatus::Pending
                    && p.candidate_id == items[pos].candidate_id
                    && p.item_type == items[pos].item_type
                    && p.normalized_value == items[pos].normalized_value
            });
            if key_taken {
                return Ok(false);
            }
            let item = &mut items[pos];
            item.status = ReviewStatus::Pending;
            item.resolved_taxonomy_id = None;
            item.duplicate_of = None;
            item.review_note = None;
            item.reviewed_at = None;
            Ok(true)
        }

        async fn reviewed_awaiting_application(&self) -> Result<Vec<UnmatchedItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| matches!(i.status, ReviewStatus::Mapped | ReviewStatus::Promoted))
                .filter(|i| i.candidate_id.is_some() && i.resolved_taxonomy_id.is_some())
                .filter(|i| i.applied_at.is_none())
                .cloned()
                .collect())
        }

        async fn mark_applied(&self, ids: &[Uuid]) -> Result<()> {
            let now = Utc::now();
            for item in self.items.lock().unwrap().iter_mut() {
                if ids.contains(&item.id) {
                    item.applied_at = Some(now);
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryLedger;
    use super::*;

    fn record<'a>(candidate: Option<Uuid>, normalized: &'a str) -> LedgerRecord<'a> {
        LedgerRecord {
            candidate_id: candidate,
            correlation_id: None,
            item_type: ItemType::Software,
            raw_value: normalized,
            normalized_value: normalized,
            suggested_taxonomy_id: None,
            similarity: None,
            method: ResolutionMethod::Unresolved,
            outcome: LedgerOutcome::NoMatch,
        }
    }

    #[tokio::test]
    async fn test_recurrence_increments_instead_of_duplicating() {
        let ledger = InMemoryLedger::default();
        let candidate = Some(Uuid::new_v4());
        let first = ledger.upsert(record(candidate, "qlikview")).await.unwrap();
        let second = ledger.upsert(record(candidate, "qlikview")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(ledger.all().len(), 1);
    }

    #[tokio::test]
    async fn test_reviewed_item_frees_the_pending_key() {
        let ledger = InMemoryLedger::default();
        let candidate = Some(Uuid::new_v4());
        let first = ledger.upsert(record(candidate, "qlikview")).await.unwrap();
        ledger
            .apply_review(
                first.id,
                ReviewTransition {
                    status: ReviewStatus::Rejected,
                    resolved_taxonomy_id: None,
                    duplicate_of: None,
                    note: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        let again = ledger.upsert(record(candidate, "qlikview")).await.unwrap();
        assert_ne!(again.id, first.id);
        assert_eq!(again.occurrence_count, 1);
    }

    #[tokio::test]
    async fn test_review_of_non_pending_item_is_refused() {
        let ledger = InMemoryLedger::default();
        let item = ledger.upsert(record(None, "tally")).await.unwrap();
        let transition = ReviewTransition {
            status: ReviewStatus::Rejected,
            resolved_taxonomy_id: None,
            duplicate_of: None,
            note: None,
        };
        assert!(ledger.apply_review(item.id, transition.clone()).await.unwrap().is_some());
        assert!(ledger.apply_review(item.id, transition).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_restores_pending_unless_key_was_retaken() {
        let ledger = InMemoryLedger::default();
        let candidate = Some(Uuid::new_v4());
        let rejected = ReviewTransition {
            status: ReviewStatus::Rejected,
            resolved_taxonomy_id: None,
            duplicate_of: None,
            note: Some("typo".to_string()),
        };

        let item = ledger.upsert(record(candidate, "tally")).await.unwrap();
        ledger.apply_review(item.id, rejected.clone()).await.unwrap().unwrap();
        assert!(!ledger.reopen(item.id, ReviewStatus::Mapped).await.unwrap());
        assert!(ledger.reopen(item.id, ReviewStatus::Rejected).await.unwrap());
        let back = ledger.get(item.id).await.unwrap().unwrap();
        assert_eq!(back.status, ReviewStatus::Pending);
        assert_eq!(back.review_note, None);

        ledger.apply_review(item.id, rejected).await.unwrap().unwrap();
        ledger.upsert(record(candidate, "tally")).await.unwrap();
        assert!(!ledger.reopen(item.id, ReviewStatus::Rejected).await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_candidates_get_distinct_rows() {
        let ledger = InMemoryLedger::default();
        ledger.upsert(record(Some(Uuid::new_v4()), "tally")).await.unwrap();
        ledger.upsert(record(Some(Uuid::new_v4()), "tally")).await.unwrap();
        assert_eq!(ledger.all().len(), 2);
    }
}
