use relevance_engine::MatchMode;
use scraper_core::CoreError;
use serde::{Deserialize, Deserializer, Serialize};

fn default_threshold() -> f64 {
    0.5
}

fn default_max_calls() -> u32 {
    200
}

/// Accepts a single target as well as a list of them.
fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(target) => Ok(vec![target]),
        OneOrMany::Many(targets) => Ok(targets),
    }
}

/// Parameters of one scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub subreddit: String,
    #[serde(
        alias = "targetStrings",
        alias = "target",
        default,
        deserialize_with = "deserialize_targets"
    )]
    pub targets: Vec<String>,
    /// Stop once this many posts have matched. `None` scans everything.
    #[serde(alias = "postLimit", default)]
    pub limit: Option<usize>,
    #[serde(alias = "matchMode", default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
}

impl ScrapeRequest {
    pub fn new<I, S>(subreddit: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subreddit: subreddit.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            limit: None,
            mode: MatchMode::default(),
            query: None,
            threshold: default_threshold(),
            max_calls: default_max_calls(),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_calls(mut self, max_calls: u32) -> Self {
        self.max_calls = max_calls;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: String| Err(CoreError::InvalidInput { message });

        if self.limit == Some(0) {
            return invalid("limit must be at least 1".to_string());
        }
        if self.max_calls == 0 {
            return invalid("max_calls must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = ScrapeRequest::new("rust", ["async"]);
        assert_eq!(request.mode, MatchMode::Keyword);
        assert_eq!(request.threshold, 0.5);
        assert_eq!(request.max_calls, 200);
        assert!(request.limit.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let base = ScrapeRequest::new("rust", ["async"]);

        assert!(base.clone().with_limit(Some(0)).validate().is_err());
        assert!(base.clone().with_limit(Some(1)).validate().is_ok());
        assert!(base.clone().with_max_calls(0).validate().is_err());
        assert!(base.clone().with_threshold(1.01).validate().is_err());
        assert!(base.clone().with_threshold(-0.1).validate().is_err());
        assert!(base.clone().with_threshold(f64::NAN).validate().is_err());
        assert!(base.clone().with_threshold(0.0).validate().is_ok());
        assert!(base.with_threshold(1.0).validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "subreddit": "rust",
            "targetStrings": ["tokio"],
            "postLimit": 10,
            "matchMode": "hybrid",
            "query": "async runtimes"
        }))
        .unwrap();

        assert_eq!(request.targets, vec!["tokio".to_string()]);
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.mode, MatchMode::Hybrid);
        assert_eq!(request.max_calls, 200);
    }

    #[test]
    fn test_deserialize_single_target() {
        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "subreddit": "rust",
            "targetStrings": "tokio"
        }))
        .unwrap();
        assert_eq!(request.targets, vec!["tokio".to_string()]);

        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "subreddit": "rust",
            "target": "tokio"
        }))
        .unwrap();
        assert_eq!(request.targets, vec!["tokio".to_string()]);

        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "subreddit": "rust",
            "target": ["tokio", "axum"]
        }))
        .unwrap();
        assert_eq!(request.targets.len(), 2);
    }

    #[test]
    fn test_deserialize_without_targets() {
        let request: ScrapeRequest =
            serde_json::from_value(serde_json::json!({ "subreddit": "rust" })).unwrap();
        assert!(request.targets.is_empty());
    }
}
