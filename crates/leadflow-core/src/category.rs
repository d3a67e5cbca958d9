//! Category key matching between rule keys and lead services.
//!
//! The default is exact string equality: "Web Design" and "web design " are
//! different categories. Normalised matching is opt-in and folds both sides
//! through [`normalize_category`] before comparison.

use serde::{Deserialize, Serialize};

/// How a lead's service is matched against rule keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMatch {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Trim, collapse internal whitespace, lower-case.
    Normalized,
}

impl CategoryMatch {
    /// Produce the lookup key for a category label under this mode.
    pub fn key(self, label: &str) -> String {
        match self {
            Self::Exact => label.to_string(),
            Self::Normalized => normalize_category(label),
        }
    }
}

/// Normalise a category label for lenient matching.
///
/// "  Web   Design " → "web design"
pub fn normalize_category(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
