use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxonomyEntryRow {
    pub id: Uuid,
    pub item_type: String,
    pub name_en: String,
    pub name_el: Option<String>,
    pub exact_aliases: Vec<String>,
    pub fuzzy_aliases: Vec<String>,
    pub category: Option<String>,
    pub occurrence_rank: i32,
    pub active: bool,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CategoryMemberRow {
    pub category: String,
    pub member_name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CertificationRuleRow {
    pub certification: String,
    pub variants: Vec<String>,
    pub skill_category: String,
    pub implied_skills: Vec<String>,
    pub confidence: String,
}
