pub mod api;
pub mod auth;
pub mod comment_tree;
pub mod listing;
pub mod metrics;

pub use api::{
    RedditApiClient, RedditClientConfig, RedditListing, RedditListingChild, RedditListingData,
    RedditPostData, MORE_CHILDREN_BATCH_SIZE,
};
pub use auth::{Credential, TokenManager, REFRESH_MARGIN};
pub use comment_tree::{CommentTreeBuilder, MoreChildrenSource, DEFAULT_MAX_RESOLUTION_PASSES};
pub use listing::PostPaginator;
pub use metrics::{ApiMetrics, FailureKind, MetricsCollector, RequestRecord, RouteStats};
