//! Character-trigram similarity with pg_trgm semantics, plus a small inverted
//! index so a query only scores terms that share at least one trigram.

use std::collections::{HashMap, HashSet};

use crate::taxonomy::normalize::normalize_term;

type Trigram = [char; 3];

/// Trigram set of a string. Each alphanumeric word is padded with two spaces
/// in front and one behind, as pg_trgm does.
pub fn trigrams(text: &str) -> HashSet<Trigram> {
    let normalized = normalize_term(text);
    let mut grams = HashSet::new();
    for word in normalized.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

fn jaccard(shared: usize, a: usize, b: usize) -> f64 {
    let union = a + b - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Similarity in [0, 1]: shared trigrams over the union of both sets.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ga = trigrams(a);
    let gb = trigrams(b);
    jaccard(ga.intersection(&gb).count(), ga.len(), gb.len())
}

#[derive(Debug, Default, Clone)]
pub struct TrigramIndex {
    postings: HashMap<Trigram, Vec<usize>>,
    sizes: Vec<usize>,
}

impl TrigramIndex {
    pub fn build<'a>(terms: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = TrigramIndex::default();
        for (doc, term) in terms.into_iter().enumerate() {
            let grams = trigrams(term);
            index.sizes.push(grams.len());
            for gram in grams {
                index.postings.entry(gram).or_default().push(doc);
            }
        }
        index
    }

    /// Every indexed term sharing a trigram with `query`, as (position, similarity),
    /// best first. Equal similarities keep index order.
    pub fn search(&self, query: &str) -> Vec<(usize, f64)> {
        let grams = trigrams(query);
        let mut shared: HashMap<usize, usize> = HashMap::new();
        for gram in &grams {
            if let Some(docs) = self.postings.get(gram) {
                for doc in docs {
                    *shared.entry(*doc).or_insert(0) += 1;
                }
            }
        }

        let mut hits: Vec<(usize, f64)> = shared
            .into_iter()
            .map(|(doc, count)| (doc, jaccard(count, grams.len(), self.sizes[doc])))
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits
    }
}
