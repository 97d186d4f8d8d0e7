//! Duplicate/similarity check for candidate identities. Exact contact details
//! win outright; otherwise names are compared with the same trigram
//! similarity the fuzzy resolver tier uses.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::CandidateRow;
use crate::taxonomy::normalize::normalize_term;
use crate::taxonomy::trigram::similarity;

pub const DEFAULT_NAME_THRESHOLD: f64 = 0.8;
/// Shortest digit suffix accepted when one number carries a country prefix.
const MIN_PHONE_SUFFIX_DIGITS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarityQuery {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Email,
    Phone,
    Name,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarCandidate {
    pub candidate_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub similarity: f64,
    pub reason: MatchReason,
}

fn phone_digits(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    digits.strip_prefix("00").map(String::from).unwrap_or(digits)
}

fn phones_match(a: &str, b: &str) -> bool {
    let (a, b) = (phone_digits(a), phone_digits(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    short == long || (short.len() >= MIN_PHONE_SUFFIX_DIGITS && long.ends_with(short.as_str()))
}

fn full_name(first: &str, last: &str) -> String {
    normalize_term(&format!("{first} {last}"))
}

/// Trigram sets ignore word order, so "last first" matches "first last".
fn name_similarity(query_first: &str, query_last: &str, candidate: &CandidateRow) -> f64 {
    let query = full_name(query_first, query_last);
    if query.is_empty() {
        return 0.0;
    }
    similarity(&query, &full_name(&candidate.first_name, &candidate.last_name))
}

pub fn find_similar(candidates: &[CandidateRow], query: &SimilarityQuery) -> Vec<SimilarCandidate> {
    let threshold = query.threshold.unwrap_or(DEFAULT_NAME_THRESHOLD);
    let email = query
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    let mut hits: Vec<SimilarCandidate> = candidates
        .iter()
        .filter_map(|c| {
            let email_hit = match (&email, &c.email) {
                (Some(q), Some(e)) => e.trim().to_lowercase() == *q,
                _ => false,
            };
            let phone_hit = match (&query.phone, &c.phone) {
                (Some(q), Some(p)) => phones_match(q, p),
                _ => false,
            };
            let (similarity, reason) = if email_hit {
                (1.0, MatchReason::Email)
            } else if phone_hit {
                (1.0, MatchReason::Phone)
            } else {
                let first = query.first_name.as_deref().unwrap_or("");
                let last = query.last_name.as_deref().unwrap_or("");
                let sim = name_similarity(first, last, c);
                if sim < threshold || sim <= 0.0 {
                    return None;
                }
                (sim, MatchReason::Name)
            };
            Some(SimilarCandidate {
                candidate_id: c.id,
                first_name: c.first_name.clone(),
                last_name: c.last_name.clone(),
                similarity,
                reason,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    hits
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn row(first: &str, last: &str, email: Option<&str>, phone: Option<&str>) -> CandidateRow {
        CandidateRow {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            created_at: Utc::now(),
        }
    }

    fn by_name(first: &str, last: &str) -> SimilarityQuery {
        SimilarityQuery {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_match_is_case_insensitive_and_certain() {
        let pool = vec![row("Eleni", "Georgiou", Some("Eleni.G@Example.com"), None)];
        let hits = find_similar(
            &pool,
            &SimilarityQuery {
                email: Some(" eleni.g@example.com ".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reason, MatchReason::Email);
        assert_eq!(hits[0].similarity, 1.0);
    }

    #[test]
    fn test_phone_match_ignores_formatting_and_country_prefix() {
        assert!(phones_match("+30 210 123 4567", "2101234567"));
        assert!(phones_match("0030-6912345678", "(691) 234-5678"));
        assert!(!phones_match("4567", "2101234567"));
        assert!(!phones_match("", ""));
    }

    #[test]
    fn test_name_similarity_handles_swapped_order_and_accents() {
        let pool = vec![row("Γιώργος", "Παπαδόπουλος", None, None), row("Anna", "Smith", None, None)];
        let hits = find_similar(&pool, &by_name("Παπαδοπουλος", "Γιωργος"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reason, MatchReason::Name);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_results_ranked_by_similarity() {
        let pool = vec![
            row("Maria", "Papadopoulou", None, None),
            row("Maria", "Papadopoulos", None, None),
        ];
        let mut query = by_name("Maria", "Papadopoulou");
        query.threshold = Some(0.5);
        let hits = find_similar(&pool, &query);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].last_name, "Papadopoulou");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let pool = vec![row("Maria", "Papadopoulou", Some("m@p.gr"), Some("6912345678"))];
        assert!(find_similar(&pool, &SimilarityQuery::default()).is_empty());
    }
}
