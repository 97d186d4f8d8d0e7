//! Relaxed scoring — weighted, partial-credit score of one candidate profile
//! against structured job requirements, with a fixed explanation record.
//!
//! Credit per criterion (defaults):
//! - role 0.25 when any role name overlaps the requirement text
//! - experience 0.35 at or above the minimum, 0.20 from 70 %, 0.10 from 50 %
//! - software 0.20 for a direct overlap with the expanded set, 0.18 when only
//!   a category relates them
//! - language 0.10 and certification 0.10 on any intersection
//!
//! Slots the requirements leave empty contribute nothing and explain as `None`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidates::aggregate::CandidateProfile;
use crate::taxonomy::categories::{related_category, Category};
use crate::taxonomy::normalize::terms_overlap;

/// Guards the ratio comparisons against float noise (2.1 / 3.0 < 0.7).
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub role: f64,
    pub experience_full: f64,
    pub experience_near: f64,
    pub experience_partial: f64,
    pub software_direct: f64,
    pub software_category: f64,
    pub language: f64,
    pub certification: f64,
    /// Fraction of the minimum that earns `experience_near`.
    pub near_ratio: f64,
    /// Fraction of the minimum that earns `experience_partial`; also the
    /// pre-filter floor.
    pub partial_ratio: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            role: 0.25,
            experience_full: 0.35,
            experience_near: 0.20,
            experience_partial: 0.10,
            software_direct: 0.20,
            software_category: 0.18,
            language: 0.10,
            certification: 0.10,
            near_ratio: 0.7,
            partial_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequirements {
    pub role: Option<String>,
    pub min_experience_years: Option<f64>,
    pub software: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub certifications: Option<Vec<String>>,
}

/// Non-blank entries of an optional list; `None` when nothing remains.
fn required(list: &Option<Vec<String>>) -> Option<Vec<&str>> {
    let items: Vec<&str> = list
        .as_deref()?
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

impl JobRequirements {
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    pub fn software(&self) -> Option<Vec<&str>> {
        required(&self.software)
    }

    pub fn languages(&self) -> Option<Vec<&str>> {
        required(&self.languages)
    }

    pub fn certifications(&self) -> Option<Vec<&str>> {
        required(&self.certifications)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceMatch {
    Full,
    Near,
    Partial,
    Insufficient,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftwareMatch {
    Direct { required: String, matched: String },
    Category { required: String, category: String },
    Unmatched,
}

/// One `Option` per criterion: `None` means the requirements did not ask.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchExplanation {
    pub role: Option<bool>,
    pub experience: Option<ExperienceMatch>,
    pub software: Option<SoftwareMatch>,
    pub language: Option<bool>,
    pub certification: Option<bool>,
    pub experience_years: f64,
}

impl MatchExplanation {
    /// At least one slot independently satisfied; experience counts from the
    /// partial band up.
    pub fn any_satisfied(&self) -> bool {
        self.role == Some(true)
            || matches!(
                self.experience,
                Some(ExperienceMatch::Full | ExperienceMatch::Near | ExperienceMatch::Partial)
            )
            || matches!(
                self.software,
                Some(SoftwareMatch::Direct { .. } | SoftwareMatch::Category { .. })
            )
            || self.language == Some(true)
            || self.certification == Some(true)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub candidate_id: Uuid,
    pub score: f64,
    pub explanation: MatchExplanation,
    pub total_experience_years: f64,
}

impl CandidateScore {
    pub fn is_eligible(&self) -> bool {
        self.score > 0.0 && self.explanation.any_satisfied()
    }
}

fn classify_experience(years: f64, min_years: f64, weights: &ScoringWeights) -> ExperienceMatch {
    if years + EPSILON >= min_years {
        ExperienceMatch::Full
    } else if years + EPSILON >= min_years * weights.near_ratio {
        ExperienceMatch::Near
    } else if years + EPSILON >= min_years * weights.partial_ratio {
        ExperienceMatch::Partial
    } else {
        ExperienceMatch::Insufficient
    }
}

fn match_software(required: &[&str], profile: &CandidateProfile, categories: &[Category]) -> SoftwareMatch {
    for req in required {
        if let Some(held) = profile.expanded_software.iter().find(|s| terms_overlap(req, s)) {
            return SoftwareMatch::Direct {
                required: req.to_string(),
                matched: held.clone(),
            };
        }
    }
    for req in required {
        if let Some(category) = related_category(categories, req, &profile.expanded_software) {
            return SoftwareMatch::Category {
                required: req.to_string(),
                category: category.name.clone(),
            };
        }
    }
    SoftwareMatch::Unmatched
}

pub fn score_candidate(
    requirements: &JobRequirements,
    profile: &CandidateProfile,
    categories: &[Category],
    weights: &ScoringWeights,
) -> CandidateScore {
    let years = profile.total_experience_years;
    let mut score = 0.0;

    let role = requirements.role().map(|wanted| {
        let hit = profile.role_names().any(|name| terms_overlap(name, wanted));
        if hit {
            score += weights.role;
        }
        hit
    });

    let experience = requirements.min_experience_years.map(|min| {
        let band = classify_experience(years, min.max(0.0), weights);
        score += match band {
            ExperienceMatch::Full => weights.experience_full,
            ExperienceMatch::Near => weights.experience_near,
            ExperienceMatch::Partial => weights.experience_partial,
            ExperienceMatch::Insufficient => 0.0,
        };
        band
    });

    let software = requirements.software().map(|wanted| {
        let m = match_software(&wanted, profile, categories);
        score += match m {
            SoftwareMatch::Direct { .. } => weights.software_direct,
            SoftwareMatch::Category { .. } => weights.software_category,
            SoftwareMatch::Unmatched => 0.0,
        };
        m
    });

    let language = requirements.languages().map(|wanted| {
        let hit = wanted
            .iter()
            .any(|code| profile.languages.iter().any(|held| held.eq_ignore_ascii_case(code)));
        if hit {
            score += weights.language;
        }
        hit
    });

    let certification = requirements.certifications().map(|wanted| {
        let hit = wanted
            .iter()
            .any(|req| profile.certification_names().any(|held| terms_overlap(held, req)));
        if hit {
            score += weights.certification;
        }
        hit
    });

    CandidateScore {
        candidate_id: profile.candidate_id,
        score: score.clamp(0.0, 1.0),
        explanation: MatchExplanation {
            role,
            experience,
            software,
            language,
            certification,
            experience_years: years,
        },
        total_experience_years: years,
    }
}
