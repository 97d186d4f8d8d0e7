//! Attribute ingestion: the contract with the upstream CV parser. Raw terms
//! are resolved one by one; resolved terms become candidate attribute records,
//! everything else is already in the ledger by the time this returns.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::candidates::experience::validate_interval;
use crate::candidates::repository::{insert_attribute, insert_interval, upsert_language, AttributeInsert};
use crate::errors::AppError;
use crate::models::vocabulary::{ItemType, ResolutionMethod};
use crate::resolver::{ResolveRequest, Suggestion, TermResolver};
use crate::taxonomy::snapshot::TaxonomySnapshot;

/// Either a bare string or a string with the CV excerpt it came from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTerm {
    Plain(String),
    WithExcerpt { value: String, excerpt: Option<String> },
}

impl RawTerm {
    pub fn value(&self) -> &str {
        match self {
            RawTerm::Plain(v) => v,
            RawTerm::WithExcerpt { value, .. } => value,
        }
    }

    pub fn excerpt(&self) -> Option<&str> {
        match self {
            RawTerm::Plain(_) => None,
            RawTerm::WithExcerpt { excerpt, .. } => excerpt.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageInput {
    pub code: String,
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperienceInput {
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<RawTerm>,
    #[serde(default)]
    pub skills: Vec<RawTerm>,
    #[serde(default)]
    pub software: Vec<RawTerm>,
    #[serde(default)]
    pub certifications: Vec<RawTerm>,
    #[serde(default)]
    pub languages: Vec<LanguageInput>,
    #[serde(default)]
    pub experience: Vec<ExperienceInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TermOutcome {
    pub raw_term: String,
    pub item_type: ItemType,
    pub taxonomy_id: Option<Uuid>,
    pub confidence: f64,
    pub method: ResolutionMethod,
    pub suggestion: Option<Suggestion>,
    pub ledger_item_id: Option<Uuid>,
    #[serde(skip)]
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub correlation_id: Option<String>,
    pub resolved: Vec<TermOutcome>,
    pub unresolved: Vec<TermOutcome>,
    pub attributes_added: usize,
    pub languages_stored: usize,
    pub intervals_stored: usize,
    pub skipped_empty: usize,
}

/// Lower-cased ISO 639 code: two or three ASCII letters.
pub fn normalize_language_code(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_lowercase())
    } else {
        Err(AppError::Validation(format!("'{code}' is not an ISO 639 language code")))
    }
}

/// Rejects the whole request before anything is written.
pub fn validate(req: &IngestRequest) -> Result<(), AppError> {
    for lang in &req.languages {
        normalize_language_code(&lang.code)?;
    }
    for exp in &req.experience {
        if exp.title.trim().is_empty() {
            return Err(AppError::Validation("experience title cannot be empty".to_string()));
        }
        validate_interval(exp.start_date, exp.end_date)?;
    }
    Ok(())
}

fn group(item_type: ItemType, terms: &[RawTerm]) -> impl Iterator<Item = (ItemType, &RawTerm)> + '_ {
    terms.iter().map(move |t| (item_type, t))
}

fn typed_terms(req: &IngestRequest) -> impl Iterator<Item = (ItemType, &RawTerm)> + '_ {
    group(ItemType::Role, &req.roles)
        .chain(group(ItemType::Skill, &req.skills))
        .chain(group(ItemType::Software, &req.software))
        .chain(group(ItemType::Certification, &req.certifications))
}

/// Runs every non-empty term through the resolver. Unresolved terms are filed
/// in the ledger under `candidate_id` by the resolver itself.
pub async fn resolve_terms(
    resolver: &TermResolver,
    snapshot: &TaxonomySnapshot,
    candidate_id: Uuid,
    req: &IngestRequest,
) -> Result<IngestReport, AppError> {
    let mut report = IngestReport {
        correlation_id: req.correlation_id.clone(),
        ..Default::default()
    };

    for (item_type, term) in typed_terms(req) {
        if term.value().trim().is_empty() {
            report.skipped_empty += 1;
            continue;
        }
        let resolution = resolver
            .resolve(
                snapshot,
                ResolveRequest {
                    raw_term: term.value(),
                    item_type,
                    candidate_id: Some(candidate_id),
                    correlation_id: req.correlation_id.as_deref(),
                },
            )
            .await?;
        let resolved = resolution.is_resolved();
        let outcome = TermOutcome {
            raw_term: term.value().to_string(),
            item_type,
            taxonomy_id: resolution.taxonomy_id,
            confidence: resolution.confidence,
            method: resolution.method,
            suggestion: resolution.suggestion,
            ledger_item_id: resolution.ledger_item_id,
            excerpt: term.excerpt().map(String::from),
        };
        if resolved {
            report.resolved.push(outcome);
        } else {
            report.unresolved.push(outcome);
        }
    }
    Ok(report)
}

pub async fn ingest_attributes(
    pool: &PgPool,
    resolver: &TermResolver,
    snapshot: &TaxonomySnapshot,
    candidate_id: Uuid,
    req: &IngestRequest,
) -> Result<IngestReport, AppError> {
    validate(req)?;
    let mut report = resolve_terms(resolver, snapshot, candidate_id, req).await?;

    for outcome in &report.resolved {
        let Some(taxonomy_id) = outcome.taxonomy_id else {
            continue;
        };
        let added = insert_attribute(
            pool,
            &AttributeInsert {
                candidate_id,
                taxonomy_id,
                item_type: outcome.item_type,
                source_excerpt: outcome.excerpt.as_deref().or(Some(outcome.raw_term.as_str())),
                confidence: outcome.confidence,
                method: outcome.method,
                verified: None,
            },
        )
        .await?;
        if added {
            report.attributes_added += 1;
        }
    }

    for lang in &req.languages {
        let code = normalize_language_code(&lang.code)?;
        upsert_language(pool, candidate_id, &code, lang.proficiency.as_deref()).await?;
        report.languages_stored += 1;
    }

    let today = Utc::now().date_naive();
    for exp in &req.experience {
        insert_interval(pool, candidate_id, exp.title.trim(), exp.start_date, exp.end_date, today).await?;
        report.intervals_stored += 1;
    }

    if !report.unresolved.is_empty() {
        warn!(
            "Candidate {candidate_id}: {} of {} terms left for review (correlation {:?})",
            report.unresolved.len(),
            report.unresolved.len() + report.resolved.len(),
            report.correlation_id
        );
    }
    info!(
        "Ingested attributes for candidate {candidate_id}: {} resolved, {} new records",
        report.resolved.len(),
        report.attributes_added
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embedding::fakes::DownEmbeddings;
    use crate::resolver::ledger::memory::InMemoryLedger;
    use crate::resolver::ResolverConfig;
    use crate::taxonomy::fixtures::{id_of, sample_snapshot};

    fn parse(json: serde_json::Value) -> IngestRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_raw_terms_accept_plain_and_excerpt_forms() {
        let req = parse(serde_json::json!({
            "correlation_id": "cv-7",
            "software": ["Excel", { "value": "SAP R/3", "excerpt": "Χρήση SAP R/3 για μισθοδοσία" }]
        }));
        assert_eq!(req.software[0], RawTerm::Plain("Excel".to_string()));
        assert_eq!(req.software[1].value(), "SAP R/3");
        assert_eq!(req.software[1].excerpt(), Some("Χρήση SAP R/3 για μισθοδοσία"));
        assert!(req.roles.is_empty());
    }

    #[test]
    fn test_language_codes_are_validated() {
        assert_eq!(normalize_language_code(" EN ").unwrap(), "en");
        assert_eq!(normalize_language_code("ell").unwrap(), "ell");
        assert!(normalize_language_code("english").is_err());
        assert!(normalize_language_code("e1").is_err());
    }

    #[test]
    fn test_reversed_interval_rejects_request() {
        let req = parse(serde_json::json!({
            "experience": [{ "title": "Accountant", "start_date": "2021-01-01", "end_date": "2020-01-01" }]
        }));
        assert!(matches!(validate(&req), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resolve_terms_splits_resolved_and_ledgered() {
        let snapshot = sample_snapshot();
        let ledger = Arc::new(InMemoryLedger::default());
        let resolver = TermResolver::new(&ResolverConfig::default(), Arc::new(DownEmbeddings), ledger.clone());
        let candidate = Uuid::new_v4();
        let req = parse(serde_json::json!({
            "correlation_id": "cv-9",
            "roles": ["Λογιστής"],
            "software": ["MS Office 2019", "Qlik Sense", "  "]
        }));

        let report = resolve_terms(&resolver, &snapshot, candidate, &req).await.unwrap();

        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.resolved.len(), 2);
        assert_eq!(report.resolved[0].taxonomy_id, Some(id_of(&snapshot, "Accountant")));
        assert_eq!(report.resolved[1].method, ResolutionMethod::Substring);
        assert_eq!(report.unresolved.len(), 1);

        let items = ledger.all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].candidate_id, Some(candidate));
        assert_eq!(items[0].correlation_id.as_deref(), Some("cv-9"));
    }
}
