//! Ranking: pre-filter, score, order and cap.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::candidates::aggregate::CandidateProfile;
use crate::errors::AppError;
use crate::matching::scoring::{score_candidate, CandidateScore, JobRequirements, ScoringWeights};
use crate::taxonomy::categories::Category;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 200;
/// Candidates loaded and scored per round trip.
pub const SCORING_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub role: Option<String>,
    pub min_experience_years: Option<f64>,
    pub software: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub certifications: Option<Vec<String>>,
    pub limit: Option<i64>,
}

impl SearchRequest {
    /// Splits into validated requirements and an effective limit.
    pub fn into_parts(self) -> Result<(JobRequirements, usize), AppError> {
        if let Some(min) = self.min_experience_years {
            if !min.is_finite() || min < 0.0 {
                return Err(AppError::Validation(
                    "min_experience_years must be a non-negative number".to_string(),
                ));
            }
        }
        let limit = match self.limit {
            None => DEFAULT_LIMIT,
            Some(l) if l < 1 => {
                return Err(AppError::Validation("limit must be at least 1".to_string()));
            }
            Some(l) => match usize::try_from(l) {
                Ok(l) if l <= MAX_LIMIT => l,
                _ => {
                    return Err(AppError::Validation(format!("limit must be at most {MAX_LIMIT}")));
                }
            },
        };
        let requirements = JobRequirements {
            role: self.role,
            min_experience_years: self.min_experience_years,
            software: self.software,
            languages: self.languages,
            certifications: self.certifications,
        };
        Ok((requirements, limit))
    }
}

/// Score desc, then total experience desc, then candidate id.
fn rank_order(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.total_experience_years
                .partial_cmp(&a.total_experience_years)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

pub fn rank_candidates(
    requirements: &JobRequirements,
    profiles: &[CandidateProfile],
    categories: &[Category],
    weights: &ScoringWeights,
    limit: usize,
) -> Vec<CandidateScore> {
    let mut ranked: Vec<CandidateScore> = profiles
        .iter()
        .map(|p| score_candidate(requirements, p, categories, weights))
        .filter(CandidateScore::is_eligible)
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(limit);
    ranked
}

/// Folds one page of ranked scores into the running top `limit`.
pub fn merge_ranked(best: &mut Vec<CandidateScore>, page: Vec<CandidateScore>, limit: usize) {
    best.extend(page);
    best.sort_by(rank_order);
    best.truncate(limit);
}
