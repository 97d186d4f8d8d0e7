use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One resolved attribute joined with its taxonomy display names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResolvedAttributeRow {
    pub candidate_id: Uuid,
    pub taxonomy_id: Uuid,
    pub item_type: String,
    pub name_en: String,
    pub name_el: Option<String>,
    pub confidence: f64,
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateLanguageRow {
    pub candidate_id: Uuid,
    pub language_code: String,
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExperienceIntervalRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub duration_months: Option<i32>,
}
