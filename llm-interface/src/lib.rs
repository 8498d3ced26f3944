use async_trait::async_trait;

pub mod anthropic;

pub use anthropic::{parse_score, AnthropicScorer};

/// Scores how relevant `content` is to `query`, in `[0, 1]`.
///
/// Implementations fail closed: any failure scores 0 instead of returning an
/// error, so a broken scorer can only make a scrape match less.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, content: &str) -> f64;

    fn name(&self) -> &str {
        "scorer"
    }
}

/// Always returns the same score. Handy for dry runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

#[async_trait]
impl RelevanceScorer for FixedScorer {
    async fn score(&self, _query: &str, _content: &str) -> f64 {
        self.0
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fixed_scorer_behind_trait_object() {
        let scorer: Arc<dyn RelevanceScorer> = Arc::new(FixedScorer(0.4));
        assert_eq!(scorer.score("q", "c").await, 0.4);
        assert_eq!(scorer.name(), "fixed");
    }
}
