//! Term normalization shared by every matcher: case-folded, accent-stripped,
//! whitespace-collapsed. Greek and Latin scripts are both supported.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub fn normalize_term(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'ς' { 'σ' } else { c })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bidirectional containment on already-normalized terms. No length floor:
/// "hr" is contained in "hr manager".
pub fn normalized_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a)
}

/// Bidirectional, case- and accent-insensitive containment on raw terms.
pub fn terms_overlap(a: &str, b: &str) -> bool {
    normalized_overlap(&normalize_term(a), &normalize_term(b))
}
