//! Category grouping — "related but not identical" membership used for
//! partial software credit. Containment checks only, never identity.

use serde::{Deserialize, Serialize};

use crate::taxonomy::normalize::{normalize_term, normalized_overlap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMember {
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub members: Vec<CategoryMember>,
    #[serde(skip_serializing)]
    normalized_terms: Vec<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, members: Vec<CategoryMember>) -> Self {
        let mut normalized_terms: Vec<String> = members
            .iter()
            .flat_map(|m| std::iter::once(&m.name).chain(m.aliases.iter()))
            .map(|t| normalize_term(t))
            .filter(|t| !t.is_empty())
            .collect();
        normalized_terms.sort();
        normalized_terms.dedup();
        Self {
            name: name.into(),
            members,
            normalized_terms,
        }
    }

    fn contains_term(&self, term: &str) -> bool {
        let term = normalize_term(term);
        self.normalized_terms
            .iter()
            .any(|member| normalized_overlap(member, &term))
    }
}

/// True when any candidate term overlaps any member name or alias of the category.
pub fn category_contains(category: &Category, candidate_terms: &[String]) -> bool {
    candidate_terms.iter().any(|t| category.contains_term(t))
}

/// First category holding both the required item and one of the candidate's terms.
pub fn related_category<'a>(
    categories: &'a [Category],
    required: &str,
    candidate_terms: &[String],
) -> Option<&'a Category> {
    categories
        .iter()
        .find(|c| c.contains_term(required) && category_contains(c, candidate_terms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn erp() -> Category {
        Category::new(
            "ERP systems",
            vec![
                CategoryMember {
                    name: "SAP".into(),
                    aliases: vec!["SAP ERP".into(), "SAP S/4HANA".into()],
                },
                CategoryMember {
                    name: "Softone".into(),
                    aliases: vec!["Soft1".into(), "SoftOne ERP".into()],
                },
                CategoryMember {
                    name: "Microsoft Dynamics".into(),
                    aliases: vec!["Navision".into()],
                },
            ],
        )
    }

    #[test]
    fn test_contains_member_by_alias() {
        assert!(category_contains(&erp(), &["soft1".to_string()]));
        assert!(category_contains(&erp(), &["Dynamics 365 Navision".to_string()]));
    }

    #[test]
    fn test_does_not_contain_unrelated() {
        assert!(!category_contains(&erp(), &["AutoCAD".to_string()]));
        assert!(!category_contains(&erp(), &[]));
    }

    #[test]
    fn test_related_category_requires_both_sides() {
        let categories = vec![erp()];
        let held = vec!["Softone".to_string()];
        assert_eq!(
            related_category(&categories, "SAP", &held).map(|c| c.name.as_str()),
            Some("ERP systems")
        );
        assert!(related_category(&categories, "AutoCAD", &held).is_none());
        assert!(related_category(&categories, "SAP", &["Excel".to_string()]).is_none());
    }
}
