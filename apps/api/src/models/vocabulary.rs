use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a value outside a closed vocabulary reaches the service boundary.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid {field} '{value}': expected one of {allowed}")]
pub struct VocabularyError {
    pub field: &'static str,
    pub value: String,
    pub allowed: &'static str,
}

macro_rules! closed_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            #[cfg(test)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = VocabularyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(VocabularyError {
                        field: $field,
                        value: other.to_string(),
                        allowed: concat!($($text, " "),+),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_vocabulary! {
    /// Attribute kinds held in the controlled vocabulary.
    ItemType, "item_type" {
        Skill => "skill",
        Software => "software",
        Certification => "certification",
        Role => "role",
    }
}

closed_vocabulary! {
    /// Which resolver tier produced a match. `Unresolved` serializes as `none`.
    ResolutionMethod, "resolution_method" {
        Exact => "exact",
        Substring => "substring",
        Fuzzy => "fuzzy",
        Semantic => "semantic",
        Unresolved => "none",
    }
}

closed_vocabulary! {
    /// Review lifecycle of an unmatched item.
    ReviewStatus, "review_status" {
        Pending => "pending",
        Mapped => "mapped",
        Promoted => "promoted",
        Rejected => "rejected",
        Duplicate => "duplicate",
    }
}

closed_vocabulary! {
    /// Why an item landed in the ledger.
    LedgerOutcome, "outcome" {
        AutoAccepted => "auto_accepted",
        Suggested => "suggested",
        NoMatch => "no_match",
    }
}

closed_vocabulary! {
    InferenceConfidence, "confidence" {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

impl ResolutionMethod {
    /// Exact and substring acceptances are trusted outright and never hit the ledger.
    pub fn is_trusted(&self) -> bool {
        matches!(self, ResolutionMethod::Exact | ResolutionMethod::Substring)
    }
}
