//! Immutable, indexed view of the controlled vocabulary. Built once per
//! load/refresh and shared across requests behind an `Arc`.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::taxonomy::TaxonomyEntryRow;
use crate::models::vocabulary::{ItemType, VocabularyError};
use crate::taxonomy::categories::Category;
use crate::taxonomy::inference::CertificationRule;
use crate::taxonomy::normalize::normalize_term;
use crate::taxonomy::trigram::TrigramIndex;

#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyEntry {
    pub id: Uuid,
    pub item_type: ItemType,
    pub name_en: String,
    pub name_el: Option<String>,
    pub exact_aliases: Vec<String>,
    pub fuzzy_aliases: Vec<String>,
    pub category: Option<String>,
    /// Lower means better established; used as a tie-break.
    pub occurrence_rank: i32,
    pub active: bool,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl TaxonomyEntry {
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name_en.as_str()).chain(self.name_el.as_deref())
    }

    /// Names followed by exact and fuzzy aliases.
    pub fn match_terms(&self) -> impl Iterator<Item = &str> {
        self.display_names()
            .chain(self.exact_aliases.iter().map(String::as_str))
            .chain(self.fuzzy_aliases.iter().map(String::as_str))
    }

    pub fn embedding_text(&self) -> String {
        match &self.name_el {
            Some(el) => format!("{} / {}", self.name_en, el),
            None => self.name_en.clone(),
        }
    }
}

impl TryFrom<TaxonomyEntryRow> for TaxonomyEntry {
    type Error = VocabularyError;

    fn try_from(row: TaxonomyEntryRow) -> Result<Self, Self::Error> {
        Ok(TaxonomyEntry {
            id: row.id,
            item_type: row.item_type.parse()?,
            name_en: row.name_en,
            name_el: row.name_el,
            exact_aliases: row.exact_aliases,
            fuzzy_aliases: row.fuzzy_aliases,
            category: row.category,
            occurrence_rank: row.occurrence_rank,
            active: row.active,
            embedding: row.embedding,
        })
    }
}

/// One normalized name or alias pointing back at its entry.
#[derive(Debug, Clone)]
pub struct IndexedTerm {
    pub entry: usize,
    pub normalized: String,
}

/// Lookup structures for a single item type. Only active entries are indexed.
#[derive(Debug, Default, Clone)]
pub struct TypeIndex {
    pub exact: HashMap<String, Vec<usize>>,
    pub terms: Vec<IndexedTerm>,
    pub trigrams: TrigramIndex,
    pub entries: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct TaxonomySnapshot {
    pub version: i64,
    entries: Vec<TaxonomyEntry>,
    by_id: HashMap<Uuid, usize>,
    indexes: HashMap<ItemType, TypeIndex>,
    pub categories: Vec<Category>,
    pub certification_rules: Vec<CertificationRule>,
}

impl TaxonomySnapshot {
    pub fn build(
        version: i64,
        entries: Vec<TaxonomyEntry>,
        categories: Vec<Category>,
        certification_rules: Vec<CertificationRule>,
    ) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut indexes: HashMap<ItemType, TypeIndex> = HashMap::new();

        for (pos, entry) in entries.iter().enumerate() {
            by_id.insert(entry.id, pos);
            if !entry.active {
                continue;
            }
            let index = indexes.entry(entry.item_type).or_default();
            index.entries.push(pos);
            for term in entry.match_terms() {
                let normalized = normalize_term(term);
                if normalized.is_empty() {
                    continue;
                }
                let hits = index.exact.entry(normalized.clone()).or_default();
                if !hits.contains(&pos) {
                    hits.push(pos);
                }
                index.terms.push(IndexedTerm {
                    entry: pos,
                    normalized,
                });
            }
        }

        for index in indexes.values_mut() {
            index.trigrams = TrigramIndex::build(index.terms.iter().map(|t| t.normalized.as_str()));
        }

        Self {
            version,
            entries,
            by_id,
            indexes,
            categories,
            certification_rules,
        }
    }

    pub fn entry(&self, id: Uuid) -> Option<&TaxonomyEntry> {
        self.by_id.get(&id).map(|pos| &self.entries[*pos])
    }

    pub fn entry_at(&self, pos: usize) -> &TaxonomyEntry {
        &self.entries[pos]
    }

    pub fn index(&self, item_type: ItemType) -> Option<&TypeIndex> {
        self.indexes.get(&item_type)
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn active_count(&self) -> usize {
        self.indexes.values().map(|i| i.entries.len()).sum()
    }
}
