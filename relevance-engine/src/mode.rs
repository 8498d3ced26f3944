use scraper_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a post is judged relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive substring match against the targets.
    #[default]
    Keyword,
    /// Scorer verdict only.
    Semantic,
    /// Keyword first, scorer on a miss.
    Hybrid,
}

impl MatchMode {
    pub fn uses_scorer(self) -> bool {
        matches!(self, MatchMode::Semantic | MatchMode::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Keyword => "keyword",
            MatchMode::Semantic => "semantic",
            MatchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(MatchMode::Keyword),
            "semantic" => Ok(MatchMode::Semantic),
            "hybrid" => Ok(MatchMode::Hybrid),
            other => Err(CoreError::InvalidInput {
                message: format!(
                    "unknown match mode '{}', expected keyword, semantic or hybrid",
                    other
                ),
            }),
        }
    }
}
