use crate::auth::TokenManager;
use crate::metrics::{ApiMetrics, FailureKind, MetricsCollector, RequestRecord};
use reqwest::{Client, Method, Response};
use scraper_core::{AppConfig, ConfigError, CoreError, RedditApiError, RedditPost};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Reddit accepts at most this many ids per `/api/morechildren` call.
pub const MORE_CHILDREN_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub num_comments: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MoreChildrenJson {
    errors: Vec<serde_json::Value>,
    data: MoreChildrenData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MoreChildrenData {
    things: Vec<RedditListingChild<serde_json::Value>>,
}

/// Everything needed to build a [`RedditApiClient`].
#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub api_base_url: String,
    pub token_url: String,
}

impl RedditClientConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let credentials = config.reddit_credentials()?;
        Ok(Self {
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            user_agent: credentials.user_agent,
            api_base_url: config.reddit.api_base_url.clone(),
            token_url: config.reddit.token_url.clone(),
        })
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    token_manager: Arc<TokenManager>,
    metrics: Arc<MetricsCollector>,
    api_base: String,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(config: RedditClientConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        let token_manager = Arc::new(TokenManager::new(
            http_client.clone(),
            config.client_id,
            config.client_secret,
            &config.token_url,
        )?);

        Ok(Self::with_token_manager(
            http_client,
            token_manager,
            config.api_base_url,
            config.user_agent,
        ))
    }

    /// Builds a client around an existing token manager, so several clients
    /// can share one cached credential.
    pub fn with_token_manager(
        http_client: Client,
        token_manager: Arc<TokenManager>,
        api_base: String,
        user_agent: String,
    ) -> Self {
        Self {
            http_client,
            token_manager,
            metrics: Arc::new(MetricsCollector::new()),
            api_base: api_base.trim_end_matches('/').to_string(),
            user_agent,
        }
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.token_manager
    }

    /// Sends an authenticated GET. `route` is the metrics label for the
    /// endpoint (e.g. `/r/{subreddit}/new`).
    pub async fn make_request(
        &self,
        route: &str,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let credential = self.token_manager.get_token().await?;
        let url = format!("{}{}", self.api_base, endpoint);
        let start_time = Instant::now();

        let request_builder = self
            .http_client
            .request(Method::GET, &url)
            .bearer_auth(&credential.access_token)
            .header("User-Agent", &self.user_agent)
            .query(query_params);

        info!("Making Reddit API request: GET {}", endpoint);
        let result = request_builder.send().await;

        let mut record = RequestRecord {
            route: route.to_string(),
            elapsed: start_time.elapsed(),
            failure: None,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for GET {}: {}", endpoint, e);
                record.failure = Some(FailureKind::Network);
                self.metrics.record(record).await;
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Request failed with status: {} for {}", status, endpoint);
            record.failure = Some(FailureKind::from_status(status.as_u16()));
            self.metrics.record(record).await;
            return Err(CoreError::RedditApi(RedditApiError::RequestFailed {
                endpoint: endpoint.to_string(),
                status_code: status.as_u16(),
                body,
            }));
        }

        debug!("Request successful: {} {}", status, endpoint);
        self.metrics.record(record).await;
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self.make_request(route, endpoint, query_params).await?;
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {}: {}", endpoint, e),
            })
        })
    }

    /// One page of `/r/{subreddit}/new`.
    pub async fn get_new_posts(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let mut params = vec![("limit", limit.to_string())];
        if let Some(after_val) = after {
            params.push(("after", after_val.to_string()));
        }

        let listing: RedditListing<RedditPostData> = self
            .get_json("/r/{subreddit}/new", &endpoint, &params)
            .await?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }

    /// Top-level comment listing for a post: the second element of
    /// `/comments/{id}`. Entries are left raw since they come in two shapes
    /// (`t1` comments and `more` placeholders).
    pub async fn get_comment_listing(
        &self,
        post_id: &str,
    ) -> Result<Vec<RedditListingChild<serde_json::Value>>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let params = [
            ("limit", "500".to_string()),
            ("depth", "10".to_string()),
            ("sort", "new".to_string()),
        ];

        let mut threads: Vec<RedditListing<serde_json::Value>> =
            self.get_json("/comments/{id}", &endpoint, &params).await?;

        if threads.len() < 2 {
            debug!("No comment listing returned for post {}", post_id);
            return Ok(Vec::new());
        }
        Ok(threads.swap_remove(1).data.children)
    }

    /// Resolves `more` placeholder ids, splitting them into batches of
    /// [`MORE_CHILDREN_BATCH_SIZE`] and concatenating the results.
    pub async fn get_more_children(
        &self,
        link_fullname: &str,
        child_ids: &[String],
    ) -> Result<Vec<RedditListingChild<serde_json::Value>>, CoreError> {
        let mut all_things = Vec::new();

        for batch in child_ids.chunks(MORE_CHILDREN_BATCH_SIZE) {
            let params = [
                ("api_type", "json".to_string()),
                ("link_id", link_fullname.to_string()),
                ("children", batch.join(",")),
            ];

            let response: MoreChildrenResponse = self
                .get_json("/api/morechildren", "/api/morechildren", &params)
                .await?;

            if !response.json.errors.is_empty() {
                debug!(
                    "morechildren for {} reported errors: {:?}",
                    link_fullname, response.json.errors
                );
            }
            all_things.extend(response.json.data.things);
        }

        debug!(
            "Resolved {} ids into {} things for {}",
            child_ids.len(),
            all_things.len(),
            link_fullname
        );
        Ok(all_things)
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.snapshot().await
    }

    pub async fn log_metrics(&self) {
        self.metrics.log_summary().await;
    }
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            selftext: post_data.selftext,
            author: post_data.author,
            url: post_data.url,
            permalink: post_data.permalink,
            created_utc: post_data.created_utc,
            num_comments: post_data.num_comments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reddit_post_conversion() {
        let post_data: RedditPostData = serde_json::from_value(serde_json::json!({
            "id": "test123",
            "title": "Test Post",
            "selftext": "This is test content",
            "author": "test_user",
            "subreddit": "test",
            "url": "https://reddit.com/r/test/comments/test123",
            "permalink": "/r/test/comments/test123/test_post/",
            "created_utc": 1640995200.0,
            "num_comments": 5,
            "score": 42
        }))
        .unwrap();

        let reddit_post: RedditPost = post_data.into();
        assert_eq!(reddit_post.id.as_deref(), Some("test123"));
        assert_eq!(reddit_post.title.as_deref(), Some("Test Post"));
        assert_eq!(
            reddit_post.selftext.as_deref(),
            Some("This is test content")
        );
        assert_eq!(reddit_post.num_comments, Some(5));
    }

    #[test]
    fn test_post_data_tolerates_missing_fields() {
        let post_data: RedditPostData =
            serde_json::from_value(serde_json::json!({ "title": "only a title" })).unwrap();
        assert!(post_data.id.is_none());
        assert!(post_data.selftext.is_none());
    }

    #[test]
    fn test_listing_without_children() {
        let listing: RedditListing<RedditPostData> = serde_json::from_value(serde_json::json!({
            "kind": "Listing",
            "data": { "after": null }
        }))
        .unwrap();
        assert!(listing.data.children.is_empty());
        assert!(listing.data.after.is_none());
    }

    #[test]
    fn test_more_children_response_shape() {
        let response: MoreChildrenResponse = serde_json::from_value(serde_json::json!({
            "json": {
                "errors": [],
                "data": {
                    "things": [
                        { "kind": "t1", "data": { "id": "c9", "body": "hi", "parent_id": "t1_c1" } }
                    ]
                }
            }
        }))
        .unwrap();
        assert_eq!(response.json.data.things.len(), 1);
        assert_eq!(response.json.data.things[0].kind, "t1");
    }
}
