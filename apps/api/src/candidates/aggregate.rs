//! Candidate Aggregate View: one read model per candidate with the expanded
//! software/skill set and total experience already computed, so the scorer
//! never has to touch rules or dates.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::candidates::experience::{months_to_years, total_experience_months};
use crate::models::candidate::{CandidateLanguageRow, CandidateRow, ExperienceIntervalRow, ResolvedAttributeRow};
use crate::models::vocabulary::{ItemType, VocabularyError};
use crate::taxonomy::inference::{expand, CertificationRule};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NamedAttribute {
    pub taxonomy_id: Uuid,
    pub name_en: String,
    pub name_el: Option<String>,
    pub confidence: f64,
    pub verified: bool,
}

impl NamedAttribute {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name_en.as_str()).chain(self.name_el.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateProfile {
    pub candidate_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<NamedAttribute>,
    pub software: Vec<NamedAttribute>,
    pub skills: Vec<NamedAttribute>,
    pub certifications: Vec<NamedAttribute>,
    /// Held software and skills plus everything implied by certifications.
    pub expanded_software: Vec<String>,
    pub languages: Vec<String>,
    pub total_experience_months: i32,
    pub total_experience_years: f64,
}

impl CandidateProfile {
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().flat_map(NamedAttribute::names)
    }

    pub fn certification_names(&self) -> impl Iterator<Item = &str> {
        self.certifications.iter().flat_map(NamedAttribute::names)
    }
}

/// Everything stored for one candidate.
#[derive(Debug, Clone, Default)]
pub struct CandidateRecords {
    pub attributes: Vec<ResolvedAttributeRow>,
    pub languages: Vec<CandidateLanguageRow>,
    pub intervals: Vec<ExperienceIntervalRow>,
}

pub fn build_profile(
    candidate: &CandidateRow,
    records: &CandidateRecords,
    rules: &[CertificationRule],
    today: NaiveDate,
) -> Result<CandidateProfile, VocabularyError> {
    let mut roles = Vec::new();
    let mut software = Vec::new();
    let mut skills = Vec::new();
    let mut certifications = Vec::new();

    for row in &records.attributes {
        let attribute = NamedAttribute {
            taxonomy_id: row.taxonomy_id,
            name_en: row.name_en.clone(),
            name_el: row.name_el.clone(),
            confidence: row.confidence,
            verified: row.verified.unwrap_or(false),
        };
        match row.item_type.parse::<ItemType>()? {
            ItemType::Role => roles.push(attribute),
            ItemType::Software => software.push(attribute),
            ItemType::Skill => skills.push(attribute),
            ItemType::Certification => certifications.push(attribute),
        }
    }

    let held: Vec<String> = software
        .iter()
        .chain(&skills)
        .flat_map(|a| a.names().map(String::from))
        .collect();
    let cert_names: Vec<String> = certifications
        .iter()
        .flat_map(|a| a.names().map(String::from))
        .collect();
    let expanded_software = expand(&held, &cert_names, rules);

    let mut languages: Vec<String> = records
        .languages
        .iter()
        .map(|l| l.language_code.to_lowercase())
        .collect();
    languages.sort();
    languages.dedup();

    let months = total_experience_months(&records.intervals, today);

    Ok(CandidateProfile {
        candidate_id: candidate.id,
        first_name: candidate.first_name.clone(),
        last_name: candidate.last_name.clone(),
        roles,
        software,
        skills,
        certifications,
        expanded_software,
        languages,
        total_experience_months: months,
        total_experience_years: months_to_years(months),
    })
}

#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn attribute(name_en: &str) -> NamedAttribute {
        NamedAttribute {
            taxonomy_id: Uuid::new_v4(),
            name_en: name_en.to_string(),
            name_el: None,
            confidence: 1.0,
            verified: false,
        }
    }

    /// Profile with roles, software and certifications given by English name.
    pub fn profile(roles: &[&str], software: &[&str], years: f64) -> CandidateProfile {
        CandidateProfile {
            candidate_id: Uuid::new_v4(),
            first_name: "Maria".to_string(),
            last_name: "Papadopoulou".to_string(),
            roles: roles.iter().map(|r| attribute(r)).collect(),
            software: software.iter().map(|s| attribute(s)).collect(),
            skills: Vec::new(),
            certifications: Vec::new(),
            expanded_software: software.iter().map(|s| s.to_string()).collect(),
            languages: Vec::new(),
            total_experience_months: (years * 12.0).round() as i32,
            total_experience_years: years,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::taxonomy::fixtures::sample_rules;

    fn row(candidate_id: Uuid, item_type: ItemType, name_en: &str, name_el: Option<&str>) -> ResolvedAttributeRow {
        ResolvedAttributeRow {
            candidate_id,
            taxonomy_id: Uuid::new_v4(),
            item_type: item_type.as_str().to_string(),
            name_en: name_en.to_string(),
            name_el: name_el.map(String::from),
            confidence: 1.0,
            verified: None,
        }
    }

    fn candidate() -> CandidateRow {
        CandidateRow {
            id: Uuid::new_v4(),
            first_name: "Giorgos".to_string(),
            last_name: "Nikolaou".to_string(),
            email: None,
            phone: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_expands_certifications_and_rolls_up_experience() {
        let c = candidate();
        let records = CandidateRecords {
            attributes: vec![
                row(c.id, ItemType::Role, "Accountant", Some("Λογιστής")),
                row(c.id, ItemType::Software, "SAP ERP", None),
                row(c.id, ItemType::Certification, "ECDL", Some("Πιστοποίηση ECDL")),
            ],
            languages: vec![
                CandidateLanguageRow {
                    candidate_id: c.id,
                    language_code: "EN".to_string(),
                    proficiency: Some("C2".to_string()),
                },
                CandidateLanguageRow {
                    candidate_id: c.id,
                    language_code: "el".to_string(),
                    proficiency: None,
                },
            ],
            intervals: vec![ExperienceIntervalRow {
                id: Uuid::new_v4(),
                candidate_id: c.id,
                title: "Accountant".to_string(),
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end_date: Some(NaiveDate::from_ymd_opt(2023, 7, 1).unwrap()),
                duration_months: Some(42),
            }],
        };
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let profile = build_profile(&c, &records, &sample_rules(), today).unwrap();

        assert_eq!(profile.role_names().collect::<Vec<_>>(), vec!["Accountant", "Λογιστής"]);
        assert_eq!(profile.expanded_software[0], "SAP ERP");
        assert!(profile.expanded_software.iter().any(|s| s == "Microsoft Excel"));
        assert!(profile.expanded_software.iter().any(|s| s == "Microsoft Word"));
        assert_eq!(profile.languages, vec!["el", "en"]);
        assert_eq!(profile.total_experience_months, 42);
        assert!((profile.total_experience_years - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_item_type_is_reported() {
        let c = candidate();
        let mut bad = row(c.id, ItemType::Skill, "Payroll", None);
        bad.item_type = "hobby".to_string();
        let records = CandidateRecords {
            attributes: vec![bad],
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(build_profile(&c, &records, &[], today).is_err());
    }
}
