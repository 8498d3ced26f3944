use serde::{Deserialize, Serialize};

pub const REDDIT_WEB_BASE: &str = "https://reddit.com";

/// A post as scanned from a subreddit listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedditPost {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    /// Site-relative, as returned by the listing (`/r/.../comments/...`).
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub num_comments: Option<u64>,
}

impl RedditPost {
    /// Title and body joined by a newline; this is what matching looks at.
    pub fn searchable_text(&self) -> String {
        format!(
            "{}\n{}",
            self.title.as_deref().unwrap_or(""),
            self.selftext.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub body: String,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            replies: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.replies.iter());
        }
        total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selftext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_comments: Option<u64>,
    pub comments: Vec<CommentNode>,
}

impl MatchedPost {
    pub fn from_post(post: &RedditPost, comments: Vec<CommentNode>) -> Self {
        Self {
            title: post.title.clone(),
            selftext: post.selftext.clone(),
            author: post.author.clone(),
            url: post.url.clone(),
            permalink: post
                .permalink
                .as_ref()
                .filter(|p| !p.is_empty())
                .map(|p| format!("{}{}", REDDIT_WEB_BASE, p)),
            created_utc: post.created_utc,
            num_comments: post.num_comments,
            comments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub subreddit: String,
    pub targets: Vec<String>,
    pub matched_post_count: usize,
    pub total_scanned: usize,
    pub posts: Vec<MatchedPost>,
}

impl ScrapeResult {
    pub fn new(subreddit: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            subreddit: subreddit.into(),
            targets,
            matched_post_count: 0,
            total_scanned: 0,
            posts: Vec::new(),
        }
    }

    pub fn push_match(&mut self, post: MatchedPost) {
        self.posts.push(post);
        self.matched_post_count = self.posts.len();
    }
}

/// Trims, lowercases and drops empty targets.
pub fn normalize_targets<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
