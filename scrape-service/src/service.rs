use crate::request::ScrapeRequest;
use llm_interface::RelevanceScorer;
use reddit_client::{CommentTreeBuilder, RedditApiClient};
use relevance_engine::RelevanceClassifier;
use scraper_core::{
    normalize_targets, CommentNode, CoreError, ErrorExt, MatchedPost, RedditPost, ScrapeConfig,
    ScrapeResult, MAX_PAGE_SIZE,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs scrapes against one Reddit client.
///
/// Posts are scanned newest first. Each match gets its full comment tree
/// before the next post is looked at, and the scan stops on the post that
/// reaches the request's limit.
pub struct ScrapeService {
    client: Arc<RedditApiClient>,
    tree_builder: CommentTreeBuilder,
    page_size: u32,
}

impl ScrapeService {
    pub fn new(client: Arc<RedditApiClient>) -> Self {
        Self {
            client,
            tree_builder: CommentTreeBuilder::default(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn from_config(client: Arc<RedditApiClient>, config: &ScrapeConfig) -> Self {
        Self::new(client)
            .with_page_size(config.page_size)
            .with_tree_builder(CommentTreeBuilder::new(config.max_resolution_passes))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_tree_builder(mut self, tree_builder: CommentTreeBuilder) -> Self {
        self.tree_builder = tree_builder;
        self
    }

    pub fn client(&self) -> &Arc<RedditApiClient> {
        &self.client
    }

    /// Scrapes one subreddit. Listing and authentication failures abort the
    /// scrape; comment failures only empty that post's tree.
    pub async fn scrape(
        &self,
        request: ScrapeRequest,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> Result<ScrapeResult, CoreError> {
        request.validate()?;

        let scrape_id = Uuid::new_v4();
        let span = info_span!(
            "scrape",
            scrape_id = %scrape_id,
            subreddit = %request.subreddit.trim()
        );
        self.run(request, scorer).instrument(span).await
    }

    async fn run(
        &self,
        request: ScrapeRequest,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> Result<ScrapeResult, CoreError> {
        let subreddit = request.subreddit.trim().to_string();
        let targets = normalize_targets(&request.targets);
        let mut result = ScrapeResult::new(subreddit.clone(), targets.clone());

        if subreddit.is_empty() {
            warn!("No subreddit given, nothing to scan");
            return Ok(result);
        }

        let has_query = request
            .query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty());
        if request.mode.uses_scorer() && (scorer.is_none() || !has_query) {
            warn!(
                mode = %request.mode,
                "Semantic matching needs both a scorer and a query; only keywords can match"
            );
        }

        let mut classifier = RelevanceClassifier::new(request.mode, &targets)
            .with_query(request.query.clone())
            .with_scorer(scorer)
            .with_threshold(request.threshold)
            .with_max_calls(request.max_calls);

        info!(
            mode = %request.mode,
            targets = targets.len(),
            limit = ?request.limit,
            "Starting scrape"
        );
        let started = Instant::now();

        let mut paginator = self.client.list_posts(&subreddit, self.page_size);
        while let Some(post) = paginator.next_post().await? {
            result.total_scanned += 1;

            if !classifier.classify(&post).await {
                continue;
            }

            let comments = self.comments_for(&post).await?;
            debug!(
                post_id = post.id.as_deref().unwrap_or(""),
                comments = comments.iter().map(CommentNode::count).sum::<usize>(),
                "Matched post"
            );
            result.push_match(MatchedPost::from_post(&post, comments));

            if request
                .limit
                .is_some_and(|limit| result.matched_post_count >= limit)
            {
                debug!("Reached limit of {} matched posts", result.matched_post_count);
                break;
            }
        }

        info!(
            matched = result.matched_post_count,
            scanned = result.total_scanned,
            pages = paginator.pages_fetched(),
            semantic_calls = classifier.semantic_calls(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scrape finished"
        );
        self.client.log_metrics().await;

        Ok(result)
    }

    /// Failures that only concern this post leave it without comments; a
    /// failed token exchange ends the scrape.
    async fn comments_for(&self, post: &RedditPost) -> Result<Vec<CommentNode>, CoreError> {
        let Some(post_id) = post.id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(Vec::new());
        };

        match self
            .client
            .fetch_comment_tree(post_id, &self.tree_builder)
            .await
        {
            Ok(tree) => Ok(tree),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                e.log_warn();
                Ok(Vec::new())
            }
        }
    }
}
