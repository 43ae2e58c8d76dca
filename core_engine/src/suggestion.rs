use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One rankable lookup result.
///
/// Ordering is rank order: higher `weight` first, ties broken by `text`
/// ascending so iteration over a sorted collection is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "cost")]
    pub weight: i64,
    #[serde(rename = "suggestion")]
    pub text: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, weight: i64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }

    /// Empty needles match everything, including a match at offset zero.
    pub fn matches(&self, substring: &str) -> bool {
        substring.is_empty() || self.text.contains(substring)
    }
}

impl Ord for Suggestion {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| self.text.cmp(&other.text))
    }
}

impl PartialOrd for Suggestion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
