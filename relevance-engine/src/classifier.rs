use crate::mode::MatchMode;
use llm_interface::RelevanceScorer;
use scraper_core::{normalize_targets, RedditPost};
use std::sync::Arc;
use tracing::debug;

/// Scorer input is cut to this many characters.
pub const MAX_SEMANTIC_INPUT_CHARS: usize = 4000;

/// Decides whether a post matches, for the lifetime of one scrape.
///
/// The classifier owns the semantic-call budget: every scorer attempt counts
/// against `max_calls`, whatever the outcome, and once the budget is spent
/// semantic evaluation quietly reports "no match".
pub struct RelevanceClassifier {
    mode: MatchMode,
    targets: Vec<String>,
    query: Option<String>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    threshold: f64,
    max_calls: u32,
    calls: u32,
}

impl RelevanceClassifier {
    pub fn new<I, S>(mode: MatchMode, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            mode,
            targets: normalize_targets(targets),
            query: None,
            scorer: None,
            threshold: 0.5,
            max_calls: 200,
            calls: 0,
        }
    }

    /// An empty or blank query counts as no query.
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_scorer(mut self, scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        self.scorer = scorer;
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

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn semantic_calls(&self) -> u32 {
        self.calls
    }

    pub fn budget_remaining(&self) -> u32 {
        self.max_calls.saturating_sub(self.calls)
    }

    pub async fn classify(&mut self, post: &RedditPost) -> bool {
        match self.mode {
            MatchMode::Keyword => self.keyword_match(post),
            MatchMode::Semantic => self.semantic_match(post).await,
            MatchMode::Hybrid => self.keyword_match(post) || self.semantic_match(post).await,
        }
    }

    pub fn keyword_match(&self, post: &RedditPost) -> bool {
        if self.targets.is_empty() {
            return false;
        }
        let text = post.searchable_text().to_lowercase();
        self.targets.iter().any(|target| text.contains(target))
    }

    async fn semantic_match(&mut self, post: &RedditPost) -> bool {
        let (Some(scorer), Some(query)) = (self.scorer.as_ref(), self.query.as_deref()) else {
            return false;
        };
        if self.calls >= self.max_calls {
            return false;
        }
        self.calls += 1;

        let content: String = post
            .searchable_text()
            .chars()
            .take(MAX_SEMANTIC_INPUT_CHARS)
            .collect();
        let score = scorer.score(query, &content).await;

        debug!(
            post_id = post.id.as_deref().unwrap_or(""),
            score,
            calls = self.calls,
            "Semantic score"
        );
        score >= self.threshold
    }
}
