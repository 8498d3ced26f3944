//! Builds a post's full comment tree.
//!
//! The initial `/comments/{id}` listing contains nested comments plus `more`
//! placeholders holding ids of comments that were left out. Those ids are
//! resolved through `/api/morechildren` in passes: each pass may surface new
//! placeholders, which are resolved in the next pass, up to a fixed cap.
//!
//! Resolved comments come back flat with a `parent_id`, so nodes live in an
//! arena keyed by fullname and are linked by index. Parents are always
//! inserted before their children, which lets the final tree be assembled
//! bottom-up in a single reverse sweep without recursion.

use crate::api::{RedditApiClient, RedditListing, RedditListingChild};
use scraper_core::{CommentNode, CoreError, RedditApiError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub const DEFAULT_MAX_RESOLUTION_PASSES: u32 = 32;

/// Something that can resolve `more` placeholder ids into comment entries.
pub trait MoreChildrenSource {
    async fn fetch_more_children(
        &self,
        link_fullname: &str,
        child_ids: &[String],
    ) -> Result<Vec<RedditListingChild<Value>>, CoreError>;
}

impl MoreChildrenSource for RedditApiClient {
    async fn fetch_more_children(
        &self,
        link_fullname: &str,
        child_ids: &[String],
    ) -> Result<Vec<RedditListingChild<Value>>, CoreError> {
        self.get_more_children(link_fullname, child_ids).await
    }
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    replies: Option<CommentReplies>,
}

/// Reddit sends `""` instead of a listing when a comment has no replies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommentReplies {
    Listing(RedditListing<Value>),
    Empty(String),
}

#[derive(Debug, Deserialize)]
struct MoreData {
    #[serde(default)]
    children: Vec<String>,
}

enum Entry {
    Comment {
        fullname: String,
        parent_id: Option<String>,
        body: String,
        replies: Vec<RedditListingChild<Value>>,
    },
    More(Vec<String>),
    Skip,
}

impl Entry {
    fn parse(child: RedditListingChild<Value>) -> Self {
        match child.kind.as_str() {
            "t1" => match serde_json::from_value::<CommentData>(child.data) {
                Ok(data) => {
                    let body = match data.body {
                        Some(body) if !body.is_empty() => body,
                        _ => return Entry::Skip,
                    };
                    let replies = match data.replies {
                        Some(CommentReplies::Listing(listing)) => listing.data.children,
                        _ => Vec::new(),
                    };
                    Entry::Comment {
                        fullname: format!("t1_{}", data.id),
                        parent_id: data.parent_id,
                        body,
                        replies,
                    }
                }
                Err(e) => {
                    debug!("Skipping malformed comment entry: {}", e);
                    Entry::Skip
                }
            },
            "more" => match serde_json::from_value::<MoreData>(child.data) {
                Ok(more) => Entry::More(more.children),
                Err(e) => {
                    debug!("Skipping malformed more entry: {}", e);
                    Entry::Skip
                }
            },
            _ => Entry::Skip,
        }
    }
}

struct ArenaNode {
    body: String,
    replies: Vec<usize>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<ArenaNode>,
    roots: Vec<usize>,
    by_fullname: HashMap<String, usize>,
}

impl Arena {
    fn insert(&mut self, fullname: String, body: String) -> Option<usize> {
        if self.by_fullname.contains_key(&fullname) {
            return None;
        }
        let idx = self.nodes.len();
        self.nodes.push(ArenaNode {
            body,
            replies: Vec::new(),
        });
        self.by_fullname.insert(fullname, idx);
        Some(idx)
    }

    fn attach(&mut self, parent: Option<usize>, idx: usize) {
        match parent {
            Some(parent) => self.nodes[parent].replies.push(idx),
            None => self.roots.push(idx),
        }
    }

    /// Adds a listing's comments under `parent` (or as roots), following
    /// nested replies. Placeholder ids are appended to `pending`.
    fn walk(
        &mut self,
        parent: Option<usize>,
        children: Vec<RedditListingChild<Value>>,
        pending: &mut Vec<String>,
    ) {
        let mut work = vec![(parent, children)];
        while let Some((parent, children)) = work.pop() {
            for child in children {
                match Entry::parse(child) {
                    Entry::Comment {
                        fullname,
                        body,
                        replies,
                        ..
                    } => {
                        let Some(idx) = self.insert(fullname, body) else {
                            continue;
                        };
                        self.attach(parent, idx);
                        if !replies.is_empty() {
                            work.push((Some(idx), replies));
                        }
                    }
                    Entry::More(ids) => pending.extend(ids),
                    Entry::Skip => {}
                }
            }
        }
    }

    /// Adds flat `morechildren` results, linking each to its parent comment
    /// when that parent is known and making it a root otherwise.
    fn attach_things(&mut self, things: Vec<RedditListingChild<Value>>, pending: &mut Vec<String>) {
        for thing in things {
            match Entry::parse(thing) {
                Entry::Comment {
                    fullname,
                    parent_id,
                    body,
                    replies,
                } => {
                    let parent = parent_id
                        .filter(|id| id.starts_with("t1_"))
                        .and_then(|id| self.by_fullname.get(&id).copied());
                    let Some(idx) = self.insert(fullname, body) else {
                        continue;
                    };
                    self.attach(parent, idx);
                    if !replies.is_empty() {
                        self.walk(Some(idx), replies, pending);
                    }
                }
                Entry::More(ids) => pending.extend(ids),
                Entry::Skip => {}
            }
        }
    }

    fn finish(self) -> Vec<CommentNode> {
        let Arena { nodes, roots, .. } = self;
        let mut built: Vec<Option<CommentNode>> = Vec::with_capacity(nodes.len());
        built.resize_with(nodes.len(), || None);

        for (idx, node) in nodes.into_iter().enumerate().rev() {
            let replies = node
                .replies
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[idx] = Some(CommentNode {
                body: node.body,
                replies,
            });
        }

        roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommentTreeBuilder {
    max_passes: u32,
}

impl Default for CommentTreeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESOLUTION_PASSES)
    }
}

impl CommentTreeBuilder {
    pub fn new(max_passes: u32) -> Self {
        Self { max_passes }
    }

    /// Builds the forest for `post_id` from its initial listing, resolving
    /// placeholders through `source`. Any source error aborts the build.
    pub async fn build<S: MoreChildrenSource>(
        &self,
        source: &S,
        post_id: &str,
        initial: Vec<RedditListingChild<Value>>,
    ) -> Result<Vec<CommentNode>, CoreError> {
        let link_fullname = format!("t3_{}", post_id);
        let mut arena = Arena::default();
        let mut pending = Vec::new();
        arena.walk(None, initial, &mut pending);

        let mut requested = HashSet::new();
        let mut passes = 0;
        loop {
            pending.retain(|id| requested.insert(id.clone()));
            if pending.is_empty() {
                break;
            }
            if passes >= self.max_passes {
                warn!(
                    "Stopping comment resolution for {} after {} passes with {} ids unresolved",
                    link_fullname,
                    passes,
                    pending.len()
                );
                break;
            }
            passes += 1;

            let things = source
                .fetch_more_children(&link_fullname, &pending)
                .await?;
            let mut next = Vec::new();
            arena.attach_things(things, &mut next);
            pending = next;
        }

        debug!(
            "Built comment tree for {} with {} comments in {} passes",
            link_fullname,
            arena.nodes.len(),
            passes
        );
        Ok(arena.finish())
    }
}

impl RedditApiClient {
    /// Fetches and assembles the full comment tree of a post. Failures are
    /// reported as [`RedditApiError::CommentFetchFailed`], except a failed
    /// token exchange, which is passed through unchanged.
    pub async fn fetch_comment_tree(
        &self,
        post_id: &str,
        builder: &CommentTreeBuilder,
    ) -> Result<Vec<CommentNode>, CoreError> {
        let result = match self.get_comment_listing(post_id).await {
            Ok(initial) => builder.build(self, post_id, initial).await,
            Err(e) => Err(e),
        };

        result.map_err(|e| match e {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. }) => e,
            e => CoreError::RedditApi(RedditApiError::CommentFetchFailed {
                post_id: post_id.to_string(),
                reason: e.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn child(value: Value) -> RedditListingChild<Value> {
        serde_json::from_value(value).unwrap()
    }

    fn comment(id: &str, parent: &str, body: &str) -> Value {
        json!({
            "kind": "t1",
            "data": { "id": id, "parent_id": parent, "body": body, "replies": "" }
        })
    }

    fn comment_with_replies(id: &str, parent: &str, body: &str, replies: Vec<Value>) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "parent_id": parent,
                "body": body,
                "replies": { "kind": "Listing", "data": { "children": replies, "after": null } }
            }
        })
    }

    fn more(ids: &[&str]) -> Value {
        json!({ "kind": "more", "data": { "children": ids } })
    }

    /// Serves canned `morechildren` results and records every request.
    #[derive(Default)]
    struct StubSource {
        responses: HashMap<String, Vec<Value>>,
        calls: Mutex<Vec<Vec<String>>>,
        endless: bool,
    }

    impl StubSource {
        fn with(mut self, id: &str, things: Vec<Value>) -> Self {
            self.responses.insert(id.to_string(), things);
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl MoreChildrenSource for StubSource {
        async fn fetch_more_children(
            &self,
            _link_fullname: &str,
            child_ids: &[String],
        ) -> Result<Vec<RedditListingChild<Value>>, CoreError> {
            let call_number = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(child_ids.to_vec());
                calls.len()
            };

            if self.endless {
                let next = format!("gen{}", call_number);
                return Ok(vec![child(more(&[next.as_str()]))]);
            }

            Ok(child_ids
                .iter()
                .flat_map(|id| self.responses.get(id).cloned().unwrap_or_default())
                .map(child)
                .collect())
        }
    }

    struct FailingSource;

    impl MoreChildrenSource for FailingSource {
        async fn fetch_more_children(
            &self,
            _link_fullname: &str,
            _child_ids: &[String],
        ) -> Result<Vec<RedditListingChild<Value>>, CoreError> {
            Err(CoreError::RedditApi(RedditApiError::RequestFailed {
                endpoint: "/api/morechildren".to_string(),
                status_code: 500,
                body: "boom".to_string(),
            }))
        }
    }

    fn bodies(nodes: &[CommentNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.body.as_str()).collect()
    }

    #[tokio::test]
    async fn test_resolves_more_children_into_tree() {
        let initial = vec![
            child(comment("a", "t3_p", "A")),
            child(comment("b", "t3_p", "B")),
            child(more(&["c", "d", "e"])),
        ];
        let source = StubSource::default()
            .with("c", vec![comment("c", "t3_p", "C")])
            .with("d", vec![comment("d", "t1_a", "D")])
            .with("e", vec![comment("e", "t1_c", "E")]);

        let tree = CommentTreeBuilder::default()
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(bodies(&tree), vec!["A", "B", "C"]);
        assert_eq!(bodies(&tree[0].replies), vec!["D"]);
        assert!(tree[1].replies.is_empty());
        assert_eq!(bodies(&tree[2].replies), vec!["E"]);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_inside_replies_attaches_to_its_parent() {
        let initial = vec![
            child(comment("a", "t3_p", "A")),
            child(comment_with_replies("b", "t3_p", "B", vec![more(&["x", "y"])])),
            child(comment("c", "t3_p", "C")),
        ];
        let source = StubSource::default()
            .with("x", vec![comment("x", "t1_b", "X")])
            .with("y", vec![comment("y", "t1_b", "Y")]);

        let tree = CommentTreeBuilder::default()
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(bodies(&tree), vec!["A", "B", "C"]);
        assert_eq!(bodies(&tree[1].replies), vec!["X", "Y"]);
        assert!(tree[0].replies.is_empty());
        assert!(tree[2].replies.is_empty());
        assert_eq!(source.calls(), vec![vec!["x".to_string(), "y".to_string()]]);
    }

    #[tokio::test]
    async fn test_nested_replies_keep_order() {
        let initial = vec![child(comment_with_replies(
            "a",
            "t3_p",
            "A",
            vec![
                comment_with_replies("a1", "t1_a", "A1", vec![comment("a1x", "t1_a1", "A1x")]),
                comment("a2", "t1_a", "A2"),
            ],
        ))];

        let tree = CommentTreeBuilder::default()
            .build(&StubSource::default(), "p", initial)
            .await
            .unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(bodies(&tree[0].replies), vec!["A1", "A2"]);
        assert_eq!(bodies(&tree[0].replies[0].replies), vec!["A1x"]);
        assert_eq!(tree[0].count(), 4);
    }

    #[tokio::test]
    async fn test_comments_without_body_are_skipped() {
        let initial = vec![
            json!({ "kind": "t1", "data": { "id": "x", "parent_id": "t3_p" } }),
            comment("y", "t3_p", ""),
            comment("z", "t3_p", "kept"),
            json!({ "kind": "t3", "data": { "id": "p" } }),
        ]
        .into_iter()
        .map(child)
        .collect();

        let tree = CommentTreeBuilder::default()
            .build(&StubSource::default(), "p", initial)
            .await
            .unwrap();

        assert_eq!(bodies(&tree), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_unknown_parent_becomes_root() {
        let initial = vec![child(more(&["orphan"]))];
        let source =
            StubSource::default().with("orphan", vec![comment("orphan", "t1_missing", "lost")]);

        let tree = CommentTreeBuilder::default()
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(bodies(&tree), vec!["lost"]);
    }

    #[tokio::test]
    async fn test_follow_up_passes() {
        let initial = vec![child(comment("a", "t3_p", "A")), child(more(&["b"]))];
        let source = StubSource::default()
            .with("b", vec![comment("b", "t1_a", "B"), more(&["c"])])
            .with("c", vec![comment("c", "t1_b", "C")]);

        let tree = CommentTreeBuilder::default()
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(source.calls(), vec![vec!["b".to_string()], vec!["c".to_string()]]);
        assert_eq!(bodies(&tree[0].replies), vec!["B"]);
        assert_eq!(bodies(&tree[0].replies[0].replies), vec!["C"]);
    }

    #[tokio::test]
    async fn test_pass_cap_stops_endless_placeholders() {
        let source = StubSource {
            endless: true,
            ..Default::default()
        };
        let initial = vec![child(comment("a", "t3_p", "A")), child(more(&["gen0"]))];

        let tree = CommentTreeBuilder::new(3)
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(source.calls().len(), 3);
        assert_eq!(bodies(&tree), vec!["A"]);
    }

    #[tokio::test]
    async fn test_repeated_ids_are_requested_once() {
        let initial = vec![child(more(&["a", "a"]))];
        let source = StubSource::default().with("a", vec![comment("a", "t3_p", "A"), more(&["a"])]);

        let tree = CommentTreeBuilder::default()
            .build(&source, "p", initial)
            .await
            .unwrap();

        assert_eq!(source.calls(), vec![vec!["a".to_string()]]);
        assert_eq!(bodies(&tree), vec!["A"]);
    }

    #[tokio::test]
    async fn test_source_error_aborts_build() {
        let initial = vec![child(more(&["a"]))];
        let result = CommentTreeBuilder::default()
            .build(&FailingSource, "p", initial)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_placeholders_means_no_requests() {
        let source = StubSource::default();
        let tree = CommentTreeBuilder::default()
            .build(&source, "p", vec![child(comment("a", "t3_p", "A"))])
            .await
            .unwrap();

        assert_eq!(tree.len(), 1);
        assert!(source.calls().is_empty());
    }
}
