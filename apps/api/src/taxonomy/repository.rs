//! Persistence for the controlled vocabulary. Every mutation bumps the
//! taxonomy version so cached snapshots know they are stale.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::taxonomy::{CategoryMemberRow, CertificationRuleRow, TaxonomyEntryRow};
use crate::models::vocabulary::ItemType;
use crate::taxonomy::categories::{Category, CategoryMember};
use crate::taxonomy::inference::CertificationRule;
use crate::taxonomy::snapshot::{TaxonomyEntry, TaxonomySnapshot};

/// A new entry created by promoting an unmatched item. The id is chosen by
/// the caller so a review can record it before the entry is written.
#[derive(Debug, Clone)]
pub struct NewTaxonomyEntry {
    pub id: Uuid,
    pub item_type: ItemType,
    pub name_en: String,
    pub name_el: Option<String>,
    pub exact_aliases: Vec<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    async fn current_version(&self) -> Result<i64>;

    async fn load_snapshot(&self) -> Result<TaxonomySnapshot>;

    /// Returns false when an entry of the same item type already uses `name_en`.
    async fn create_entry(&self, entry: NewTaxonomyEntry) -> Result<bool>;

    /// Appends an exact alias. Returns false when the entry does not exist.
    async fn add_alias(&self, id: Uuid, alias: &str) -> Result<bool>;

    /// (id, text to embed) for active entries without a stored vector.
    async fn entries_missing_embeddings(&self) -> Result<Vec<(Uuid, String)>>;

    async fn store_embeddings(&self, vectors: &[(Uuid, Vec<f32>)]) -> Result<()>;
}

pub struct PgTaxonomyRepository {
    pool: PgPool,
}

impl PgTaxonomyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BUMP_VERSION: &str = "UPDATE taxonomy_version SET version = version + 1";

#[async_trait]
impl TaxonomyRepository for PgTaxonomyRepository {
    async fn current_version(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT version FROM taxonomy_version")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn load_snapshot(&self) -> Result<TaxonomySnapshot> {
        let version = self.current_version().await?;

        let entries = sqlx::query_as::<_, TaxonomyEntryRow>(
            "SELECT * FROM taxonomy_entries ORDER BY occurrence_rank, name_en",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TaxonomyEntry::try_from)
        .collect::<Result<Vec<_>, _>>()
        .context("taxonomy_entries holds a value outside the vocabulary")?;

        let member_rows = sqlx::query_as::<_, CategoryMemberRow>(
            "SELECT category, member_name, aliases FROM category_members ORDER BY category, member_name",
        )
        .fetch_all(&self.pool)
        .await?;
        let categories = group_categories(member_rows);

        let certification_rules = sqlx::query_as::<_, CertificationRuleRow>(
            r#"
            SELECT certification, variants, skill_category, implied_skills, confidence
            FROM certification_rules
            ORDER BY certification
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CertificationRule::try_from)
        .collect::<Result<Vec<_>, _>>()
        .context("certification_rules holds an unknown confidence tag")?;

        info!(
            "Loaded taxonomy v{version}: {} entries, {} categories, {} certification rules",
            entries.len(),
            categories.len(),
            certification_rules.len()
        );

        Ok(TaxonomySnapshot::build(
            version,
            entries,
            categories,
            certification_rules,
        ))
    }

    async fn create_entry(&self, entry: NewTaxonomyEntry) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO taxonomy_entries (id, item_type, name_en, name_el, exact_aliases, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.item_type.as_str())
        .bind(&entry.name_en)
        .bind(&entry.name_el)
        .bind(&entry.exact_aliases)
        .bind(&entry.category)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await?;
                return Ok(false);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create taxonomy entry '{}'", entry.name_en));
            }
        }
        sqlx::query(BUMP_VERSION).execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Created {} taxonomy entry {} '{}'", entry.item_type, entry.id, entry.name_en);
        Ok(true)
    }

    async fn add_alias(&self, id: Uuid, alias: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE taxonomy_entries
            SET exact_aliases = array_append(exact_aliases, $2)
            WHERE id = $1 AND NOT ($2 = ANY(exact_aliases))
            "#,
        )
        .bind(id)
        .bind(alias)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taxonomy_entries WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.commit().await?;
            return Ok(exists);
        }

        sqlx::query(BUMP_VERSION).execute(&mut *tx).await?;
        tx.commit().await?;
        info!("Added alias '{alias}' to taxonomy entry {id}");
        Ok(true)
    }

    async fn entries_missing_embeddings(&self) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query_as::<_, TaxonomyEntryRow>(
            "SELECT * FROM taxonomy_entries WHERE active AND embedding IS NULL ORDER BY occurrence_rank",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(Uuid, String)> {
                let entry = TaxonomyEntry::try_from(row)?;
                Ok((entry.id, entry.embedding_text()))
            })
            .collect()
    }

    async fn store_embeddings(&self, vectors: &[(Uuid, Vec<f32>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, vector) in vectors {
            sqlx::query("UPDATE taxonomy_entries SET embedding = $2 WHERE id = $1")
                .bind(id)
                .bind(vector)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(BUMP_VERSION).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn group_categories(rows: Vec<CategoryMemberRow>) -> Vec<Category> {
    let mut grouped: Vec<(String, Vec<CategoryMember>)> = Vec::new();
    for row in rows {
        let member = CategoryMember {
            name: row.member_name,
            aliases: row.aliases,
        };
        match grouped.last_mut() {
            Some((name, members)) if *name == row.category => members.push(member),
            _ => grouped.push((row.category, vec![member])),
        }
    }
    grouped
        .into_iter()
        .map(|(name, members)| Category::new(name, members))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &str, member: &str) -> CategoryMemberRow {
        CategoryMemberRow {
            category: category.to_string(),
            member_name: member.to_string(),
            aliases: vec![],
        }
    }

    #[test]
    fn test_group_categories_keeps_sorted_runs_together() {
        let grouped = group_categories(vec![
            row("CRM", "Salesforce"),
            row("ERP systems", "SAP"),
            row("ERP systems", "Softone"),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[1].name, "ERP systems");
        assert_eq!(grouped[1].members.len(), 2);
    }

    #[test]
    fn test_group_categories_empty() {
        assert!(group_categories(vec![]).is_empty());
    }
}
