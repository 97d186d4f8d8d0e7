//! Resolver tiers. Each tier is one matching strategy behind `ResolverTier`;
//! `TermResolver` composes them in fixed priority order.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, embed_all, EmbeddingService};
use crate::models::vocabulary::{ItemType, ResolutionMethod};
use crate::taxonomy::snapshot::{TaxonomySnapshot, TypeIndex};

/// Raw term contains a taxonomy name or alias ("ms office 2019" ⊇ "ms office").
pub const CONTAINS_ALIAS_CONFIDENCE: f64 = 0.9;
/// Raw term is contained in a taxonomy name or alias ("excel" ⊆ "microsoft excel").
pub const CONTAINED_IN_ALIAS_CONFIDENCE: f64 = 0.85;
/// Shortest side allowed in a tier-2 containment. Keeps "c" or "r" from
/// resolving to half the vocabulary.
pub const MIN_CONTAINMENT_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierMatch {
    pub taxonomy_id: Uuid,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// Confident enough to resolve.
    Accepted(TierMatch),
    /// Plausible, needs a human to confirm.
    Suggested(TierMatch),
    /// No acceptance; optionally the closest thing seen.
    Miss { hint: Option<TierMatch> },
    /// The tier could not run (external dependency down).
    Unavailable,
}

/// The term as seen by every tier.
#[derive(Debug, Clone, Copy)]
pub struct TermQuery<'a> {
    pub raw: &'a str,
    pub normalized: &'a str,
    pub item_type: ItemType,
}

#[async_trait]
pub trait ResolverTier: Send + Sync {
    fn method(&self) -> ResolutionMethod;

    async fn try_match(&self, query: TermQuery<'_>, snapshot: &TaxonomySnapshot) -> TierOutcome;
}

/// Picks the best (score, rank) candidate: higher score, then lower rank.
fn better(a: (f64, i32), b: (f64, i32)) -> bool {
    match a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.1 < b.1,
    }
}

fn rank_of(snapshot: &TaxonomySnapshot, pos: usize) -> i32 {
    snapshot.entry_at(pos).occurrence_rank
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 1 — exact
// ────────────────────────────────────────────────────────────────────────────

pub struct ExactTier;

#[async_trait]
impl ResolverTier for ExactTier {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Exact
    }

    async fn try_match(&self, query: TermQuery<'_>, snapshot: &TaxonomySnapshot) -> TierOutcome {
        let Some(index) = snapshot.index(query.item_type) else {
            return TierOutcome::Miss { hint: None };
        };
        let best = index
            .exact
            .get(query.normalized)
            .and_then(|hits| hits.iter().copied().min_by_key(|pos| rank_of(snapshot, *pos)));
        match best {
            Some(pos) => TierOutcome::Accepted(TierMatch {
                taxonomy_id: snapshot.entry_at(pos).id,
                confidence: 1.0,
            }),
            None => TierOutcome::Miss { hint: None },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 2 — bidirectional substring containment
// ────────────────────────────────────────────────────────────────────────────

pub struct SubstringTier;

impl SubstringTier {
    fn best_containment(index: &TypeIndex, snapshot: &TaxonomySnapshot, term: &str) -> Option<TierMatch> {
        let term_len = term.chars().count();
        // (confidence, matched length, rank, entry position)
        let mut best: Option<(f64, usize, i32, usize)> = None;

        for indexed in &index.terms {
            let alias = indexed.normalized.as_str();
            let alias_len = alias.chars().count();
            let confidence = if alias_len >= MIN_CONTAINMENT_CHARS && term.contains(alias) {
                CONTAINS_ALIAS_CONFIDENCE
            } else if term_len >= MIN_CONTAINMENT_CHARS && alias.contains(term) {
                CONTAINED_IN_ALIAS_CONFIDENCE
            } else {
                continue;
            };
            let rank = rank_of(snapshot, indexed.entry);
            let candidate = (confidence, alias_len, rank, indexed.entry);
            let replace = match best {
                None => true,
                Some((c, len, r, _)) => {
                    confidence > c || (confidence == c && (alias_len > len || (alias_len == len && rank < r)))
                }
            };
            if replace {
                best = Some(candidate);
            }
        }

        best.map(|(confidence, _, _, pos)| TierMatch {
            taxonomy_id: snapshot.entry_at(pos).id,
            confidence,
        })
    }
}

#[async_trait]
impl ResolverTier for SubstringTier {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Substring
    }

    async fn try_match(&self, query: TermQuery<'_>, snapshot: &TaxonomySnapshot) -> TierOutcome {
        let Some(index) = snapshot.index(query.item_type) else {
            return TierOutcome::Miss { hint: None };
        };
        match Self::best_containment(index, snapshot, query.normalized) {
            Some(m) => TierOutcome::Accepted(m),
            None => TierOutcome::Miss { hint: None },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 3 — trigram similarity
// ────────────────────────────────────────────────────────────────────────────

pub struct FuzzyTier {
    pub threshold: f64,
}

#[async_trait]
impl ResolverTier for FuzzyTier {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Fuzzy
    }

    async fn try_match(&self, query: TermQuery<'_>, snapshot: &TaxonomySnapshot) -> TierOutcome {
        let Some(index) = snapshot.index(query.item_type) else {
            return TierOutcome::Miss { hint: None };
        };

        let mut best: Option<(f64, i32, usize)> = None;
        for (term_pos, sim) in index.trigrams.search(query.normalized) {
            let entry = index.terms[term_pos].entry;
            let rank = rank_of(snapshot, entry);
            if best.map_or(true, |(s, r, _)| better((sim, rank), (s, r))) {
                best = Some((sim, rank, entry));
            }
        }

        match best {
            Some((sim, _, pos)) => {
                let m = TierMatch {
                    taxonomy_id: snapshot.entry_at(pos).id,
                    confidence: sim,
                };
                if sim >= self.threshold {
                    TierOutcome::Accepted(m)
                } else {
                    TierOutcome::Miss { hint: Some(m) }
                }
            }
            None => TierOutcome::Miss { hint: None },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 4 — embedding similarity
// ────────────────────────────────────────────────────────────────────────────

pub struct SemanticTier {
    pub embeddings: Arc<dyn EmbeddingService>,
    pub accept_threshold: f64,
    pub suggest_threshold: f64,
}

#[async_trait]
impl ResolverTier for SemanticTier {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Semantic
    }

    async fn try_match(&self, query: TermQuery<'_>, snapshot: &TaxonomySnapshot) -> TierOutcome {
        let Some(index) = snapshot.index(query.item_type) else {
            return TierOutcome::Miss { hint: None };
        };
        let embedded: Vec<usize> = index
            .entries
            .iter()
            .copied()
            .filter(|pos| snapshot.entry_at(*pos).embedding.is_some())
            .collect();
        if embedded.is_empty() {
            return TierOutcome::Miss { hint: None };
        }

        let input = [query.raw.trim().to_string()];
        let query_vector = match embed_all(self.embeddings.as_ref(), &input).await {
            Ok(mut vectors) => match vectors.pop() {
                Some(v) => v,
                None => return TierOutcome::Unavailable,
            },
            Err(e) => {
                warn!("Semantic tier skipped for '{}': {e}", query.raw);
                return TierOutcome::Unavailable;
            }
        };

        let mut best: Option<(f64, i32, usize)> = None;
        for pos in embedded {
            let entry = snapshot.entry_at(pos);
            let Some(vector) = entry.embedding.as_deref() else {
                continue;
            };
            let sim = cosine_similarity(&query_vector, vector);
            if best.map_or(true, |(s, r, _)| better((sim, entry.occurrence_rank), (s, r))) {
                best = Some((sim, entry.occurrence_rank, pos));
            }
        }

        let Some((sim, _, pos)) = best else {
            return TierOutcome::Miss { hint: None };
        };
        let m = TierMatch {
            taxonomy_id: snapshot.entry_at(pos).id,
            confidence: sim.clamp(0.0, 1.0),
        };
        if sim >= self.accept_threshold {
            TierOutcome::Accepted(m)
        } else if sim >= self.suggest_threshold {
            TierOutcome::Suggested(m)
        } else {
            TierOutcome::Miss { hint: None }
        }
    }
}
