//! Term Resolver — maps a raw extracted term to a taxonomy identifier through
//! an ordered chain of tiers, filing anything short of a trusted match in the
//! unmatched-item ledger.

pub mod handlers;
pub mod ledger;
pub mod review;
pub mod tiers;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingService;
use crate::errors::AppError;
use crate::models::vocabulary::{ItemType, LedgerOutcome, ResolutionMethod};
use crate::resolver::ledger::{LedgerRecord, UnmatchedLedger};
use crate::resolver::tiers::{
    ExactTier, FuzzyTier, ResolverTier, SemanticTier, SubstringTier, TermQuery, TierMatch,
    TierOutcome,
};
use crate::taxonomy::normalize::normalize_term;
use crate::taxonomy::snapshot::TaxonomySnapshot;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub fuzzy_threshold: f64,
    pub semantic_accept_threshold: f64,
    pub semantic_suggest_threshold: f64,
    /// Keep fuzzy/semantic acceptances in the ledger for taxonomy monitoring.
    pub record_auto_accepted: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            semantic_accept_threshold: 0.85,
            semantic_suggest_threshold: 0.70,
            record_auto_accepted: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub raw_term: &'a str,
    pub item_type: ItemType,
    pub candidate_id: Option<Uuid>,
    pub correlation_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    pub taxonomy_id: Uuid,
    pub similarity: f64,
    pub method: ResolutionMethod,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Resolution {
    pub taxonomy_id: Option<Uuid>,
    pub confidence: f64,
    pub method: ResolutionMethod,
    pub suggestion: Option<Suggestion>,
    /// Ledger row touched by this call, if any.
    pub ledger_item_id: Option<Uuid>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.taxonomy_id.is_some()
    }
}

pub struct TermResolver {
    tiers: Vec<Box<dyn ResolverTier>>,
    ledger: Arc<dyn UnmatchedLedger>,
    record_auto_accepted: bool,
}

impl TermResolver {
    /// Standard chain: exact → substring → fuzzy → semantic.
    pub fn new(
        config: &ResolverConfig,
        embeddings: Arc<dyn EmbeddingService>,
        ledger: Arc<dyn UnmatchedLedger>,
    ) -> Self {
        let tiers: Vec<Box<dyn ResolverTier>> = vec![
            Box::new(ExactTier),
            Box::new(SubstringTier),
            Box::new(FuzzyTier {
                threshold: config.fuzzy_threshold,
            }),
            Box::new(SemanticTier {
                embeddings,
                accept_threshold: config.semantic_accept_threshold,
                suggest_threshold: config.semantic_suggest_threshold,
            }),
        ];
        Self::with_tiers(tiers, ledger, config.record_auto_accepted)
    }

    pub fn with_tiers(
        tiers: Vec<Box<dyn ResolverTier>>,
        ledger: Arc<dyn UnmatchedLedger>,
        record_auto_accepted: bool,
    ) -> Self {
        Self {
            tiers,
            ledger,
            record_auto_accepted,
        }
    }

    pub async fn resolve(
        &self,
        snapshot: &TaxonomySnapshot,
        request: ResolveRequest<'_>,
    ) -> Result<Resolution, AppError> {
        let normalized = normalize_term(request.raw_term);
        if normalized.is_empty() {
            return Err(AppError::Validation("raw_term cannot be empty".to_string()));
        }
        let query = TermQuery {
            raw: request.raw_term,
            normalized: &normalized,
            item_type: request.item_type,
        };

        // Closest non-accepted candidate seen so far, and whether it came from
        // a tier's "needs confirmation" band rather than a plain near miss.
        let mut suggestion: Option<(Suggestion, bool)> = None;

        for tier in &self.tiers {
            let method = tier.method();
            match tier.try_match(query, snapshot).await {
                TierOutcome::Accepted(m) => {
                    debug!(
                        "'{}' ({}) resolved by {method} tier",
                        request.raw_term, request.item_type
                    );
                    let mut resolution = Resolution {
                        taxonomy_id: Some(m.taxonomy_id),
                        confidence: m.confidence,
                        method,
                        suggestion: None,
                        ledger_item_id: None,
                    };
                    if !method.is_trusted() && self.record_auto_accepted {
                        let accepted = as_suggestion(m, method);
                        let item = self
                            .record(
                                &request,
                                &normalized,
                                Some(&accepted),
                                method,
                                LedgerOutcome::AutoAccepted,
                            )
                            .await?;
                        resolution.ledger_item_id = Some(item);
                    }
                    return Ok(resolution);
                }
                TierOutcome::Suggested(m) => {
                    let candidate = as_suggestion(m, method);
                    let replace = suggestion
                        .as_ref()
                        .map_or(true, |(s, banded)| !banded || candidate.similarity > s.similarity);
                    if replace {
                        suggestion = Some((candidate, true));
                    }
                }
                TierOutcome::Miss { hint: Some(m) } => {
                    let candidate = as_suggestion(m, method);
                    let replace = suggestion
                        .as_ref()
                        .map_or(true, |(s, banded)| !banded && candidate.similarity > s.similarity);
                    if replace {
                        suggestion = Some((candidate, false));
                    }
                }
                TierOutcome::Miss { hint: None } => {}
                TierOutcome::Unavailable => {
                    warn!(
                        "{method} tier unavailable while resolving '{}'; continuing without it",
                        request.raw_term
                    );
                }
            }
        }

        let (outcome, suggestion) = match suggestion {
            Some((s, true)) => (LedgerOutcome::Suggested, Some(s)),
            Some((s, false)) => (LedgerOutcome::NoMatch, Some(s)),
            None => (LedgerOutcome::NoMatch, None),
        };
        let method = suggestion
            .as_ref()
            .map(|s| s.method)
            .unwrap_or(ResolutionMethod::Unresolved);
        let item = self
            .record(&request, &normalized, suggestion.as_ref(), method, outcome)
            .await?;

        debug!(
            "'{}' ({}) left unresolved as {outcome}",
            request.raw_term, request.item_type
        );

        Ok(Resolution {
            taxonomy_id: None,
            confidence: suggestion.as_ref().map_or(0.0, |s| s.similarity),
            method: ResolutionMethod::Unresolved,
            suggestion,
            ledger_item_id: Some(item),
        })
    }

    async fn record(
        &self,
        request: &ResolveRequest<'_>,
        normalized: &str,
        suggestion: Option<&Suggestion>,
        method: ResolutionMethod,
        outcome: LedgerOutcome,
    ) -> Result<Uuid, AppError> {
        let item = self
            .ledger
            .upsert(LedgerRecord {
                candidate_id: request.candidate_id,
                correlation_id: request.correlation_id,
                item_type: request.item_type,
                raw_value: request.raw_term.trim(),
                normalized_value: normalized,
                suggested_taxonomy_id: suggestion.map(|s| s.taxonomy_id),
                similarity: suggestion.map(|s| s.similarity),
                method,
                outcome,
            })
            .await?;
        Ok(item.id)
    }
}

fn as_suggestion(m: TierMatch, method: ResolutionMethod) -> Suggestion {
    Suggestion {
        taxonomy_id: m.taxonomy_id,
        similarity: m.confidence,
        method,
    }
}
