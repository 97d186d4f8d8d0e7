use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::vocabulary::{
    ItemType, LedgerOutcome, ResolutionMethod, ReviewStatus, VocabularyError,
};

#[derive(Debug, Clone, FromRow)]
pub struct UnmatchedItemRow {
    pub id: Uuid,
    pub candidate_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub item_type: String,
    pub raw_value: String,
    pub normalized_value: String,
    pub suggested_taxonomy_id: Option<Uuid>,
    pub similarity: Option<f64>,
    pub resolution_method: String,
    pub outcome: String,
    pub status: String,
    pub occurrence_count: i32,
    pub resolved_taxonomy_id: Option<Uuid>,
    pub duplicate_of: Option<Uuid>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Ledger item with its vocabulary columns parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedItem {
    pub id: Uuid,
    pub candidate_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub item_type: ItemType,
    pub raw_value: String,
    pub normalized_value: String,
    pub suggested_taxonomy_id: Option<Uuid>,
    pub similarity: Option<f64>,
    pub resolution_method: ResolutionMethod,
    pub outcome: LedgerOutcome,
    pub status: ReviewStatus,
    pub occurrence_count: i32,
    pub resolved_taxonomy_id: Option<Uuid>,
    pub duplicate_of: Option<Uuid>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl TryFrom<UnmatchedItemRow> for UnmatchedItem {
    type Error = VocabularyError;

    fn try_from(row: UnmatchedItemRow) -> Result<Self, Self::Error> {
        Ok(UnmatchedItem {
            id: row.id,
            candidate_id: row.candidate_id,
            correlation_id: row.correlation_id,
            item_type: row.item_type.parse()?,
            raw_value: row.raw_value,
            normalized_value: row.normalized_value,
            suggested_taxonomy_id: row.suggested_taxonomy_id,
            similarity: row.similarity,
            resolution_method: row.resolution_method.parse()?,
            outcome: row.outcome.parse()?,
            status: row.status.parse()?,
            occurrence_count: row.occurrence_count,
            resolved_taxonomy_id: row.resolved_taxonomy_id,
            duplicate_of: row.duplicate_of,
            review_note: row.review_note,
            reviewed_at: row.reviewed_at,
            applied_at: row.applied_at,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        })
    }
}
