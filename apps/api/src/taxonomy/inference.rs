//! Certification → implied skill expansion. Runs once per candidate before
//! scoring so holders are not penalized for omitting implied competencies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::taxonomy::CertificationRuleRow;
use crate::models::vocabulary::{InferenceConfidence, VocabularyError};
use crate::taxonomy::normalize::{normalize_term, normalized_overlap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificationRule {
    pub certification: String,
    pub variants: Vec<String>,
    pub skill_category: String,
    pub implied_skills: Vec<String>,
    pub confidence: InferenceConfidence,
}

impl CertificationRule {
    /// Tolerates spelling variants: any overlap with the name or a listed variant.
    pub fn applies_to(&self, held_certification: &str) -> bool {
        let held = normalize_term(held_certification);
        std::iter::once(&self.certification)
            .chain(self.variants.iter())
            .any(|v| normalized_overlap(&normalize_term(v), &held))
    }
}

impl TryFrom<CertificationRuleRow> for CertificationRule {
    type Error = VocabularyError;

    fn try_from(row: CertificationRuleRow) -> Result<Self, Self::Error> {
        Ok(CertificationRule {
            certification: row.certification,
            variants: row.variants,
            skill_category: row.skill_category,
            implied_skills: row.implied_skills,
            confidence: row.confidence.parse()?,
        })
    }
}

/// Union of held attributes and every skill implied by held certifications,
/// de-duplicated on the normalized form. First spelling seen wins, so
/// expanding an already-expanded set returns it unchanged.
pub fn expand(
    attributes: &[String],
    certifications: &[String],
    rules: &[CertificationRule],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut expanded = Vec::with_capacity(attributes.len());

    let implied = certifications.iter().flat_map(|cert| {
        rules
            .iter()
            .filter(move |rule| rule.applies_to(cert))
            .flat_map(|rule| rule.implied_skills.iter())
    });

    for item in attributes.iter().chain(implied) {
        let key = normalize_term(item);
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            expanded.push(item.clone());
        }
    }
    expanded
}
