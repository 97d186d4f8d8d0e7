use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::candidates::aggregate::{build_profile, CandidateProfile, CandidateRecords};
use crate::candidates::experience::{interval_months, stale_durations};
use crate::models::candidate::{CandidateLanguageRow, CandidateRow, ExperienceIntervalRow, ResolvedAttributeRow};
use crate::models::vocabulary::{ItemType, ResolutionMethod};
use crate::taxonomy::inference::CertificationRule;

#[derive(Debug, Clone)]
pub struct NewCandidate<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

/// One resolved attribute to persist against a candidate.
#[derive(Debug, Clone)]
pub struct AttributeInsert<'a> {
    pub candidate_id: Uuid,
    pub taxonomy_id: Uuid,
    pub item_type: ItemType,
    pub source_excerpt: Option<&'a str>,
    pub confidence: f64,
    pub method: ResolutionMethod,
    pub verified: Option<bool>,
}

pub async fn insert_candidate(pool: &PgPool, new: &NewCandidate<'_>) -> Result<CandidateRow> {
    let row = sqlx::query_as::<_, CandidateRow>(
        r#"
        INSERT INTO candidates (first_name, last_name, email, phone)
        VALUES ($1, $2, $3, $4)
        RETURNING id, first_name, last_name, email, phone, created_at
        "#,
    )
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(new.email)
    .bind(new.phone)
    .fetch_one(pool)
    .await?;
    info!("Registered candidate {}", row.id);
    Ok(row)
}

pub async fn get_candidate(pool: &PgPool, id: Uuid) -> Result<Option<CandidateRow>> {
    let row = sqlx::query_as::<_, CandidateRow>(
        "SELECT id, first_name, last_name, email, phone, created_at FROM candidates WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_candidates(pool: &PgPool) -> Result<Vec<CandidateRow>> {
    let rows = sqlx::query_as::<_, CandidateRow>(
        "SELECT id, first_name, last_name, email, phone, created_at FROM candidates ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns false when the (candidate, taxonomy id) pair already exists.
pub async fn insert_attribute(pool: &PgPool, attr: &AttributeInsert<'_>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO candidate_attributes
            (candidate_id, taxonomy_id, item_type, source_excerpt, confidence, resolution_method, verified)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (candidate_id, taxonomy_id) DO NOTHING
        "#,
    )
    .bind(attr.candidate_id)
    .bind(attr.taxonomy_id)
    .bind(attr.item_type.as_str())
    .bind(attr.source_excerpt)
    .bind(attr.confidence)
    .bind(attr.method.as_str())
    .bind(attr.verified)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn upsert_language(
    pool: &PgPool,
    candidate_id: Uuid,
    language_code: &str,
    proficiency: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO candidate_languages (candidate_id, language_code, proficiency)
        VALUES ($1, $2, $3)
        ON CONFLICT (candidate_id, language_code)
        DO UPDATE SET proficiency = COALESCE(EXCLUDED.proficiency, candidate_languages.proficiency)
        "#,
    )
    .bind(candidate_id)
    .bind(language_code)
    .bind(proficiency)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stores an interval with its duration computed as of `today`.
pub async fn insert_interval(
    pool: &PgPool,
    candidate_id: Uuid,
    title: &str,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO experience_intervals (candidate_id, title, start_date, end_date, duration_months)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(candidate_id)
    .bind(title)
    .bind(start_date)
    .bind(end_date)
    .bind(interval_months(start_date, end_date, today))
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Attributes, languages and intervals for the given candidates, keyed by id.
pub async fn load_records(pool: &PgPool, candidate_ids: &[Uuid]) -> Result<HashMap<Uuid, CandidateRecords>> {
    let attributes = sqlx::query_as::<_, ResolvedAttributeRow>(
        r#"
        SELECT ca.candidate_id, ca.taxonomy_id, te.item_type, te.name_en, te.name_el,
               ca.confidence, ca.verified
        FROM candidate_attributes ca
        JOIN taxonomy_entries te ON te.id = ca.taxonomy_id
        WHERE ca.candidate_id = ANY($1)
        ORDER BY ca.created_at
        "#,
    )
    .bind(candidate_ids)
    .fetch_all(pool)
    .await?;

    let languages = sqlx::query_as::<_, CandidateLanguageRow>(
        "SELECT candidate_id, language_code, proficiency FROM candidate_languages WHERE candidate_id = ANY($1)",
    )
    .bind(candidate_ids)
    .fetch_all(pool)
    .await?;

    let intervals = sqlx::query_as::<_, ExperienceIntervalRow>(
        r#"
        SELECT id, candidate_id, title, start_date, end_date, duration_months
        FROM experience_intervals
        WHERE candidate_id = ANY($1)
        ORDER BY start_date
        "#,
    )
    .bind(candidate_ids)
    .fetch_all(pool)
    .await?;

    let mut records: HashMap<Uuid, CandidateRecords> = HashMap::new();
    for row in attributes {
        records.entry(row.candidate_id).or_default().attributes.push(row);
    }
    for row in languages {
        records.entry(row.candidate_id).or_default().languages.push(row);
    }
    for row in intervals {
        records.entry(row.candidate_id).or_default().intervals.push(row);
    }
    Ok(records)
}

pub async fn load_profile(
    pool: &PgPool,
    id: Uuid,
    rules: &[CertificationRule],
    today: NaiveDate,
) -> Result<Option<CandidateProfile>> {
    let Some(candidate) = get_candidate(pool, id).await? else {
        return Ok(None);
    };
    let mut records = load_records(pool, &[id]).await?;
    let records = records.remove(&id).unwrap_or_default();
    let profile = build_profile(&candidate, &records, rules, today)
        .with_context(|| format!("candidate {id} has an attribute of unknown type"))?;
    Ok(Some(profile))
}

/// Aggregate views for every candidate.
/// One keyset page of profiles ordered by candidate id, starting after `after`.
pub async fn load_profiles_page(
    pool: &PgPool,
    after: Option<Uuid>,
    page_size: i64,
    rules: &[CertificationRule],
    today: NaiveDate,
) -> Result<Vec<CandidateProfile>> {
    let candidates = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT id, first_name, last_name, email, phone, created_at
        FROM candidates
        WHERE ($1::uuid IS NULL OR id > $1)
        ORDER BY id
        LIMIT $2
        "#,
    )
    .bind(after)
    .bind(page_size)
    .fetch_all(pool)
    .await?;
    let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
    let mut records = load_records(pool, &ids).await?;

    candidates
        .iter()
        .map(|c| {
            let r = records.remove(&c.id).unwrap_or_default();
            build_profile(c, &r, rules, today)
                .with_context(|| format!("candidate {} has an attribute of unknown type", c.id))
        })
        .collect()
}

/// Recomputes stored durations that are missing or stale. Returns rows updated.
pub async fn backfill_durations(pool: &PgPool, today: NaiveDate) -> Result<u64> {
    let intervals = sqlx::query_as::<_, ExperienceIntervalRow>(
        "SELECT id, candidate_id, title, start_date, end_date, duration_months FROM experience_intervals",
    )
    .fetch_all(pool)
    .await?;

    let stale = stale_durations(&intervals, today);
    if stale.is_empty() {
        return Ok(0);
    }
    let (ids, months): (Vec<Uuid>, Vec<i32>) = stale.into_iter().unzip();

    let result = sqlx::query(
        r#"
        UPDATE experience_intervals AS e
        SET duration_months = s.months
        FROM UNNEST($1::uuid[], $2::int4[]) AS s(id, months)
        WHERE e.id = s.id
        "#,
    )
    .bind(&ids)
    .bind(&months)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
