//! Controlled vocabulary: entries, categories, certification rules, and the
//! snapshot/cache lifecycle that serves them to the resolver and scorer.

pub mod cache;
pub mod categories;
pub mod inference;
pub mod normalize;
pub mod repository;
pub mod snapshot;
pub mod trigram;

#[cfg(test)]
pub mod fixtures {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::models::vocabulary::{InferenceConfidence, ItemType};
    use crate::taxonomy::categories::{Category, CategoryMember};
    use crate::taxonomy::inference::CertificationRule;
    use crate::taxonomy::repository::{NewTaxonomyEntry, TaxonomyRepository};
    use crate::taxonomy::snapshot::{TaxonomyEntry, TaxonomySnapshot};

    pub fn entry(item_type: ItemType, name_en: &str, aliases: &[&str]) -> TaxonomyEntry {
        TaxonomyEntry {
            id: Uuid::new_v4(),
            item_type,
            name_en: name_en.to_string(),
            name_el: None,
            exact_aliases: aliases.iter().map(|a| a.to_string()).collect(),
            fuzzy_aliases: vec![],
            category: None,
            occurrence_rank: 100,
            active: true,
            embedding: None,
        }
    }

    fn greek(mut e: TaxonomyEntry, name_el: &str) -> TaxonomyEntry {
        e.name_el = Some(name_el.to_string());
        e
    }

    fn embedded(mut e: TaxonomyEntry, vector: [f32; 3]) -> TaxonomyEntry {
        e.embedding = Some(vector.to_vec());
        e
    }

    fn ranked(mut e: TaxonomyEntry, rank: i32) -> TaxonomyEntry {
        e.occurrence_rank = rank;
        e
    }

    pub fn sample_entries() -> Vec<TaxonomyEntry> {
        vec![
            ranked(
                entry(ItemType::Software, "Microsoft Office", &["MS Office", "Office 365"]),
                10,
            ),
            ranked(
                entry(ItemType::Software, "Microsoft Excel", &["Excel", "MS Excel"]),
                5,
            ),
            entry(ItemType::Software, "Microsoft Word", &["MS Word"]),
            embedded(
                ranked(entry(ItemType::Software, "SAP ERP", &["SAP", "SAP R/3"]), 20),
                [0.0, 1.0, 0.0],
            ),
            embedded(
                entry(ItemType::Software, "Softone", &["Soft1", "SoftOne ERP"]),
                [1.0, 0.0, 0.0],
            ),
            embedded(
                entry(ItemType::Software, "Power BI", &["Microsoft Power BI"]),
                [0.0, 0.0, 1.0],
            ),
            entry(ItemType::Software, "AutoCAD", &[]),
            greek(
                entry(ItemType::Role, "Accountant", &["Accounting Officer"]),
                "Λογιστής",
            ),
            greek(
                entry(ItemType::Role, "Chief Accountant", &[]),
                "Προϊστάμενος Λογιστηρίου",
            ),
            entry(ItemType::Role, "Software Engineer", &["Software Developer"]),
            greek(entry(ItemType::Skill, "Payroll", &[]), "Μισθοδοσία"),
            entry(ItemType::Skill, "IFRS", &["International Financial Reporting Standards"]),
            greek(
                entry(ItemType::Certification, "ECDL", &["ICDL"]),
                "Πιστοποίηση ECDL",
            ),
        ]
    }

    pub fn sample_categories() -> Vec<Category> {
        vec![Category::new(
            "ERP systems",
            vec![
                CategoryMember {
                    name: "SAP".into(),
                    aliases: vec!["SAP ERP".into(), "SAP Business One".into()],
                },
                CategoryMember {
                    name: "Softone".into(),
                    aliases: vec!["Soft1".into()],
                },
                CategoryMember {
                    name: "Microsoft Dynamics".into(),
                    aliases: vec!["Navision".into(), "Dynamics 365".into()],
                },
            ],
        )]
    }

    pub fn sample_rules() -> Vec<CertificationRule> {
        vec![CertificationRule {
            certification: "ECDL".into(),
            variants: vec!["ICDL".into()],
            skill_category: "Office productivity".into(),
            implied_skills: vec!["Microsoft Word".into(), "Microsoft Excel".into()],
            confidence: InferenceConfidence::High,
        }]
    }

    pub fn sample_snapshot() -> TaxonomySnapshot {
        TaxonomySnapshot::build(1, sample_entries(), sample_categories(), sample_rules())
    }

    pub fn id_of(snapshot: &TaxonomySnapshot, name_en: &str) -> Uuid {
        snapshot
            .entries()
            .iter()
            .find(|e| e.name_en == name_en)
            .map(|e| e.id)
            .unwrap_or_else(|| panic!("fixture entry '{name_en}' missing"))
    }

    /// In-memory repository whose snapshot reflects every mutation.
    pub struct FakeTaxonomyRepository {
        version: AtomicI64,
        entries: Mutex<Vec<TaxonomyEntry>>,
    }

    impl Default for FakeTaxonomyRepository {
        fn default() -> Self {
            Self {
                version: AtomicI64::new(1),
                entries: Mutex::new(sample_entries()),
            }
        }
    }

    impl FakeTaxonomyRepository {
        pub fn bump_version(&self) {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TaxonomyRepository for FakeTaxonomyRepository {
        async fn current_version(&self) -> Result<i64> {
            Ok(self.version.load(Ordering::SeqCst))
        }

        async fn load_snapshot(&self) -> Result<TaxonomySnapshot> {
            let entries = self.entries.lock().unwrap().clone();
            Ok(TaxonomySnapshot::build(
                self.version.load(Ordering::SeqCst),
                entries,
                sample_categories(),
                sample_rules(),
            ))
        }

        async fn create_entry(&self, new: NewTaxonomyEntry) -> Result<bool> {
            {
                let mut entries = self.entries.lock().unwrap();
                if entries
                    .iter()
                    .any(|e| e.item_type == new.item_type && e.name_en == new.name_en)
                {
                    return Ok(false);
                }
                let mut created = entry(new.item_type, &new.name_en, &[]);
                created.id = new.id;
                created.name_el = new.name_el;
                created.exact_aliases = new.exact_aliases;
                created.category = new.category;
                entries.push(created);
            }
            self.bump_version();
            Ok(true)
        }

        async fn add_alias(&self, id: Uuid, alias: &str) -> Result<bool> {
            let found = {
                let mut entries = self.entries.lock().unwrap();
                let hit = entries.iter_mut().find(|e| e.id == id);
                match hit {
                    Some(e) => {
                        e.exact_aliases.push(alias.to_string());
                        true
                    }
                    None => false,
                }
            };
            if found {
                self.bump_version();
            }
            Ok(found)
        }

        async fn entries_missing_embeddings(&self) -> Result<Vec<(Uuid, String)>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.active && e.embedding.is_none())
                .map(|e| (e.id, e.embedding_text()))
                .collect())
        }

        async fn store_embeddings(&self, vectors: &[(Uuid, Vec<f32>)]) -> Result<()> {
            {
                let mut entries = self.entries.lock().unwrap();
                for (id, vector) in vectors {
                    if let Some(e) = entries.iter_mut().find(|e| e.id == *id) {
                        e.embedding = Some(vector.clone());
                    }
                }
            }
            self.bump_version();
            Ok(())
        }
    }
}
