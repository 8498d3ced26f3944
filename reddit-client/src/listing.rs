use crate::api::RedditApiClient;
use scraper_core::{CoreError, RedditPost, MAX_PAGE_SIZE};
use std::collections::VecDeque;
use tracing::debug;

/// Lazily walks `/r/{subreddit}/new`, one page at a time, newest first.
///
/// A page is only requested once the previous one has been drained, so the
/// caller controls how far the walk goes. The walk ends when a page comes
/// back empty or without an `after` cursor.
pub struct PostPaginator<'a> {
    client: &'a RedditApiClient,
    subreddit: String,
    page_size: u32,
    after: Option<String>,
    buffer: VecDeque<RedditPost>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'a> PostPaginator<'a> {
    pub fn new(client: &'a RedditApiClient, subreddit: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            subreddit: subreddit.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    pub async fn next_post(&mut self) -> Result<Option<RedditPost>, CoreError> {
        loop {
            if let Some(post) = self.buffer.pop_front() {
                return Ok(Some(post));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    async fn fetch_page(&mut self) -> Result<(), CoreError> {
        let listing = self
            .client
            .get_new_posts(&self.subreddit, self.page_size, self.after.as_deref())
            .await?;
        self.pages_fetched += 1;

        let children = listing.data.children;
        if children.is_empty() {
            debug!("r/{} returned an empty page, stopping", self.subreddit);
            self.exhausted = true;
            return Ok(());
        }

        self.after = listing.data.after;
        if self.after.is_none() {
            debug!("r/{} has no further pages", self.subreddit);
            self.exhausted = true;
        }

        self.buffer
            .extend(children.into_iter().map(|child| RedditPost::from(child.data)));
        Ok(())
    }
}

impl RedditApiClient {
    /// Paginator over a subreddit's newest posts, `page_size` per request
    /// (clamped to 1..=100).
    pub fn list_posts(&self, subreddit: &str, page_size: u32) -> PostPaginator<'_> {
        PostPaginator::new(self, subreddit, page_size)
    }
}
