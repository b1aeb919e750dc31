//! Raw GraphQL nodes to canonical records.
//!
//! The GraphQL `__typename` decides what a node becomes:
//!
//! | `__typename`                | Result                          |
//! |-----------------------------|---------------------------------|
//! | `Issue`                     | item, with its comments         |
//! | `PullRequest`               | item, with comments and reviews |
//! | `Release`                   | item                            |
//! | `IssueComment`              | child (comment)                 |
//! | `PullRequestReview`         | child (review verdict)          |
//! | `PullRequestReviewComment`  | child (review comment)          |
//!
//! Anything else is an `Unsupported` error rather than being dropped, so a
//! query that starts returning new kinds of nodes fails loudly.

mod raw;

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    CanonicalChild, CanonicalItem, ChildKind, ItemCommon, ItemDetail, NodeId, ReviewState,
    ThreadInfo,
};

use raw::{
    RawComment, RawIssue, RawPullRequest, RawRelease, RawReview, RawReviewComment, RawThread,
    author, nodes, repository,
};

/// Error type for normalization failures.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("node has no __typename")]
    MissingTypename,

    #[error("unsupported entity type {typename:?}")]
    Unsupported { typename: String },

    /// Deserialization failed (includes missing required fields).
    #[error("malformed {typename} node: {source}")]
    Malformed {
        typename: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A child together with the child it replies to, if any.
///
/// `parent: None` means the child hangs directly off the item.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecord {
    pub child: CanonicalChild,
    pub parent: Option<NodeId>,
}

impl ChildRecord {
    fn top_level(child: CanonicalChild) -> Self {
        Self {
            child,
            parent: None,
        }
    }
}

/// How many conversation comments a node carried versus how many exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommentPaging {
    pub fetched: usize,
    pub total: Option<u64>,
}

impl CommentPaging {
    /// True when the first page of comments was not all of them.
    pub fn is_incomplete(&self) -> bool {
        self.total.is_some_and(|total| total > self.fetched as u64)
    }
}

/// An item and every child that came embedded in its node.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub item: CanonicalItem,
    pub children: Vec<ChildRecord>,
    pub comments: CommentPaging,
}

impl NormalizedItem {
    /// Swaps the embedded conversation comments for a complete list.
    pub fn replace_comments(&mut self, comments: Vec<CanonicalChild>) {
        self.children
            .retain(|record| !(record.parent.is_none() && record.child.kind == ChildKind::Comment));
        self.comments = CommentPaging {
            fetched: comments.len(),
            total: Some(comments.len() as u64),
        };
        self.children
            .extend(comments.into_iter().map(ChildRecord::top_level));
    }
}

/// A normalized node of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Item(Box<NormalizedItem>),
    Child(CanonicalChild),
}

/// The `__typename` of a raw node.
pub fn typename(raw: &Value) -> Option<&str> {
    raw.get("__typename").and_then(Value::as_str)
}

/// Normalizes a node of any supported kind.
pub fn normalize(raw: &Value) -> Result<Entity, NormalizeError> {
    let kind = typename(raw).ok_or(NormalizeError::MissingTypename)?;
    match kind {
        "Issue" | "PullRequest" | "Release" => {
            normalize_item(raw).map(|item| Entity::Item(Box::new(item)))
        }
        "IssueComment" => normalize_comment(raw).map(Entity::Child),
        "PullRequestReview" => {
            let review: RawReview = parse(kind, raw)?;
            Ok(Entity::Child(review_child(review)))
        }
        "PullRequestReviewComment" => {
            let comment: RawReviewComment = parse(kind, raw)?;
            Ok(Entity::Child(review_comment_child(comment, &HashMap::new(), None)))
        }
        other => Err(NormalizeError::Unsupported {
            typename: other.to_string(),
        }),
    }
}

/// Normalizes an issue, pull request or release node.
pub fn normalize_item(raw: &Value) -> Result<NormalizedItem, NormalizeError> {
    let kind = typename(raw).ok_or(NormalizeError::MissingTypename)?;
    match kind {
        "Issue" => Ok(issue(parse(kind, raw)?)),
        "PullRequest" => Ok(pull_request(parse(kind, raw)?)),
        "Release" => Ok(release(parse(kind, raw)?)),
        other => Err(NormalizeError::Unsupported {
            typename: other.to_string(),
        }),
    }
}

/// Normalizes an issue or pull request conversation comment.
pub fn normalize_comment(raw: &Value) -> Result<CanonicalChild, NormalizeError> {
    let comment: RawComment = parse("IssueComment", raw)?;
    Ok(comment_child(comment))
}

fn parse<'v, T: Deserialize<'v>>(typename: &str, raw: &'v Value) -> Result<T, NormalizeError> {
    T::deserialize(raw).map_err(|source| NormalizeError::Malformed {
        typename: typename.to_string(),
        source,
    })
}

// ============================================================================
// Items
// ============================================================================

fn issue(raw: RawIssue) -> NormalizedItem {
    let (comments, paging) = conversation(raw.comments);
    let item = CanonicalItem {
        common: ItemCommon {
            id: NodeId::new(raw.id),
            number: Some(raw.number),
            title: raw.title,
            url: raw.url,
            author: author(raw.author),
            body: raw.body.unwrap_or_default(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: raw.closed_at,
            labels: nodes(raw.labels).into_iter().map(Into::into).collect(),
            repository: repository(raw.repository),
        },
        detail: ItemDetail::Issue {
            closed: raw.closed,
            state_reason: raw.state_reason,
        },
    };
    NormalizedItem {
        item,
        children: comments,
        comments: paging,
    }
}

fn pull_request(raw: RawPullRequest) -> NormalizedItem {
    let (mut children, paging) = conversation(raw.comments);
    children.extend(review_children(nodes(raw.reviews), nodes(raw.review_threads)));
    let item = CanonicalItem {
        common: ItemCommon {
            id: NodeId::new(raw.id),
            number: Some(raw.number),
            title: raw.title,
            url: raw.url,
            author: author(raw.author),
            body: raw.body.unwrap_or_default(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: raw.closed_at,
            labels: nodes(raw.labels).into_iter().map(Into::into).collect(),
            repository: repository(raw.repository),
        },
        detail: ItemDetail::PullRequest {
            closed: raw.closed,
            merged: raw.merged,
            merged_at: raw.merged_at,
            draft: raw.is_draft,
        },
    };
    NormalizedItem {
        item,
        children,
        comments: paging,
    }
}

fn release(raw: RawRelease) -> NormalizedItem {
    let title = match raw.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => raw.tag_name.clone(),
    };
    let item = CanonicalItem {
        common: ItemCommon {
            id: NodeId::new(raw.id),
            number: None,
            title,
            url: raw.url,
            author: author(raw.author),
            body: raw.description.unwrap_or_default(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: None,
            labels: Vec::new(),
            repository: repository(raw.repository),
        },
        detail: ItemDetail::Release {
            tag_name: raw.tag_name,
            draft: raw.is_draft,
            prerelease: raw.is_prerelease,
            published_at: raw.published_at,
        },
    };
    NormalizedItem {
        item,
        children: Vec::new(),
        comments: CommentPaging::default(),
    }
}

// ============================================================================
// Children
// ============================================================================

fn conversation(
    raw: Option<raw::RawConnection<RawComment>>,
) -> (Vec<ChildRecord>, CommentPaging) {
    let Some(connection) = raw else {
        return (Vec::new(), CommentPaging::default());
    };
    let total = connection.total_count;
    let children: Vec<ChildRecord> = connection
        .into_nodes()
        .into_iter()
        .map(|c| ChildRecord::top_level(comment_child(c)))
        .collect();
    let paging = CommentPaging {
        fetched: children.len(),
        total,
    };
    (children, paging)
}

fn comment_child(raw: RawComment) -> CanonicalChild {
    CanonicalChild {
        id: NodeId::new(raw.id),
        kind: ChildKind::Comment,
        author: author(raw.author),
        body: raw.body.unwrap_or_default(),
        url: raw.url,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        review_state: None,
        thread: None,
    }
}

fn review_child(raw: RawReview) -> CanonicalChild {
    CanonicalChild {
        id: NodeId::new(raw.id),
        kind: ChildKind::Review,
        author: author(raw.author),
        body: raw.body.unwrap_or_default(),
        url: raw.url,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        review_state: Some(raw.state),
        thread: None,
    }
}

fn review_comment_child(
    raw: RawReviewComment,
    verdicts: &HashMap<String, ReviewState>,
    thread: Option<ThreadInfo>,
) -> CanonicalChild {
    let review_state = raw
        .pull_request_review
        .as_ref()
        .and_then(|review| verdicts.get(&review.id))
        .copied();
    CanonicalChild {
        id: NodeId::new(raw.id),
        kind: ChildKind::ReviewComment,
        author: author(raw.author),
        body: raw.body.unwrap_or_default(),
        url: raw.url,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        review_state,
        thread,
    }
}

/// Builds the review part of a pull request's children.
///
/// Each review thread becomes a root (its first comment, carrying the thread
/// facts and its review's verdict) with the remaining comments as replies.
/// A review becomes a node of its own only when it says something outside
/// the threads: a body, or a bare verdict with no comments at all. Pending
/// reviews are invisible to everyone but their author and are skipped.
fn review_children(reviews: Vec<RawReview>, threads: Vec<RawThread>) -> Vec<ChildRecord> {
    let verdicts: HashMap<String, ReviewState> =
        reviews.iter().map(|r| (r.id.clone(), r.state)).collect();
    let mut children = Vec::new();

    for review in reviews {
        if review.state == ReviewState::Pending {
            continue;
        }
        let has_body = review.body.as_deref().is_some_and(|b| !b.trim().is_empty());
        if has_body || !review.has_comments() {
            children.push(ChildRecord::top_level(review_child(review)));
        }
    }

    for thread in threads {
        let info = ThreadInfo {
            is_resolved: thread.is_resolved,
            path: thread.path,
        };
        let mut comments = nodes(thread.comments).into_iter();
        let Some(first) = comments.next() else {
            continue;
        };
        let root = review_comment_child(first, &verdicts, Some(info));
        let root_id = root.id.clone();
        children.push(ChildRecord::top_level(root));
        for reply in comments {
            children.push(ChildRecord {
                child: review_comment_child(reply, &verdicts, None),
                parent: Some(root_id.clone()),
            });
        }
    }

    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, bot, comment, connection, issue, pull_request, release, user};
    use crate::types::{AuthorKind, ItemKind, Label, RepoId, StateReason};
    use serde_json::json;

    // ─── Items ────────────────────────────────────────────────────────────────

    #[test]
    fn issue_with_labels_and_comments() {
        let mut raw = issue("I_1", 7, at(1), user("alice"));
        raw["labels"] = json!({"nodes": [
            {"name": "bug", "color": "d73a4a"},
            {"name": "help wanted", "color": "008672"}
        ]});
        raw["stateReason"] = json!("NOT_PLANNED");
        raw["closed"] = json!(true);
        raw["closedAt"] = json!(at(3));
        raw["comments"] = connection(vec![comment("C_1", at(2), user("bob"))]);

        let normalized = normalize_item(&raw).unwrap();
        let item = &normalized.item;
        assert_eq!(item.kind(), ItemKind::Issue);
        assert_eq!(item.common.number, Some(7));
        assert_eq!(item.common.repository, Some(RepoId::new("o", "r")));
        assert_eq!(
            item.common.labels,
            vec![
                Label {
                    name: "bug".to_string(),
                    color: "d73a4a".to_string()
                },
                Label {
                    name: "help wanted".to_string(),
                    color: "008672".to_string()
                },
            ]
        );
        assert!(item.is_closed());
        assert_eq!(
            item.detail,
            ItemDetail::Issue {
                closed: true,
                state_reason: Some(StateReason::NotPlanned)
            }
        );
        assert_eq!(item.own_activity(), at(3));

        assert_eq!(normalized.children.len(), 1);
        assert_eq!(normalized.children[0].child.kind, ChildKind::Comment);
        assert_eq!(normalized.children[0].parent, None);
        assert!(!normalized.comments.is_incomplete());
    }

    #[test]
    fn ghost_author_is_none() {
        let raw = issue("I_1", 1, at(1), json!({"__typename": "User", "login": "ghost"}));
        assert_eq!(normalize_item(&raw).unwrap().item.author(), None);

        let raw = issue("I_2", 2, at(1), Value::Null);
        assert_eq!(normalize_item(&raw).unwrap().item.author(), None);
    }

    #[test]
    fn bots_are_recognised_by_typename() {
        let raw = issue("I_1", 1, at(1), bot("dependabot"));
        let item = normalize_item(&raw).unwrap().item;
        let author = item.author().unwrap();
        assert_eq!(author.kind, AuthorKind::Bot);
        assert!(author.is_bot());

        // A bot-looking login on a User account is still a user.
        let raw = issue("I_2", 2, at(1), user("renovate-bot"));
        let item = normalize_item(&raw).unwrap().item;
        assert!(!item.author().unwrap().is_bot());
    }

    #[test]
    fn release_title_falls_back_to_tag() {
        let mut raw = release("RE_1", "v1.2.0", at(4), user("alice"));
        raw["name"] = json!("");
        let item = normalize_item(&raw).unwrap().item;
        assert_eq!(item.kind(), ItemKind::Release);
        assert_eq!(item.common.title, "v1.2.0");
        assert_eq!(item.published_at(), Some(at(4)));
    }

    #[test]
    fn incomplete_comment_page_is_reported() {
        let mut raw = issue("I_1", 1, at(1), user("alice"));
        raw["comments"] = json!({"totalCount": 150, "nodes": [comment("C_1", at(2), user("bob"))]});
        let mut normalized = normalize_item(&raw).unwrap();
        assert!(normalized.comments.is_incomplete());

        let all: Vec<_> = (0..3)
            .map(|i| normalize_comment(&comment(&format!("C_{i}"), at(2), user("bob"))).unwrap())
            .collect();
        normalized.replace_comments(all);
        assert_eq!(normalized.children.len(), 3);
        assert!(!normalized.comments.is_incomplete());
    }

    // ─── Pull request reviews ─────────────────────────────────────────────────

    fn review(id: &str, state: &str, body: &str, comment_count: u64) -> Value {
        json!({
            "__typename": "PullRequestReview",
            "id": id,
            "url": format!("https://github.com/o/r/pull/1#pullrequestreview-{id}"),
            "body": body,
            "state": state,
            "createdAt": at(2),
            "updatedAt": at(2),
            "author": user("carol"),
            "comments": {"totalCount": comment_count, "nodes": []}
        })
    }

    fn review_comment(id: &str, review_id: &str) -> Value {
        json!({
            "__typename": "PullRequestReviewComment",
            "id": id,
            "url": format!("https://github.com/o/r/pull/1#discussion_{id}"),
            "body": "nit",
            "createdAt": at(3),
            "updatedAt": at(3),
            "author": user("carol"),
            "pullRequestReview": {"id": review_id}
        })
    }

    #[test]
    fn review_threads_nest_replies_under_first_comment() {
        let mut raw = pull_request("PR_1", 1, at(1), user("alice"));
        raw["reviews"] = json!({"nodes": [
            review("R_1", "CHANGES_REQUESTED", "", 2),
            review("R_2", "APPROVED", "", 0),
            review("R_3", "COMMENTED", "Looks mostly fine", 1),
            review("R_4", "PENDING", "draft", 0),
        ]});
        raw["reviewThreads"] = json!({"nodes": [{
            "id": "T_1",
            "isResolved": true,
            "path": "src/lib.rs",
            "comments": {"totalCount": 2, "nodes": [
                review_comment("RC_1", "R_1"),
                review_comment("RC_2", "R_3"),
            ]}
        }]});

        let normalized = normalize_item(&raw).unwrap();
        let by_id: HashMap<&str, &ChildRecord> = normalized
            .children
            .iter()
            .map(|r| (r.child.id.as_str(), r))
            .collect();

        // R_1's only content is its thread comment; R_4 is pending.
        assert!(!by_id.contains_key("R_1"));
        assert!(!by_id.contains_key("R_4"));
        assert_eq!(by_id["R_2"].child.review_state, Some(ReviewState::Approved));
        assert_eq!(by_id["R_3"].child.kind, ChildKind::Review);

        let root = by_id["RC_1"];
        assert_eq!(root.parent, None);
        assert_eq!(root.child.review_state, Some(ReviewState::ChangesRequested));
        assert_eq!(
            root.child.thread,
            Some(ThreadInfo {
                is_resolved: true,
                path: Some("src/lib.rs".to_string())
            })
        );
        assert_eq!(by_id["RC_2"].parent, Some(NodeId::new("RC_1")));
        assert_eq!(by_id["RC_2"].child.thread, None);
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    #[test]
    fn dispatches_on_typename() {
        assert!(matches!(
            normalize(&issue("I_1", 1, at(1), user("a"))).unwrap(),
            Entity::Item(_)
        ));
        match normalize(&comment("C_1", at(1), user("a"))).unwrap() {
            Entity::Child(child) => assert_eq!(child.kind, ChildKind::Comment),
            other => panic!("expected child, got {other:?}"),
        }
        match normalize(&review("R_1", "APPROVED", "", 0)).unwrap() {
            Entity::Child(child) => assert_eq!(child.review_state, Some(ReviewState::Approved)),
            other => panic!("expected child, got {other:?}"),
        }
    }

    #[test]
    fn unknown_typename_is_unsupported() {
        let err = normalize(&json!({"__typename": "Discussion", "id": "D_1"})).unwrap_err();
        match err {
            NormalizeError::Unsupported { typename } => assert_eq!(typename, "Discussion"),
            other => panic!("expected Unsupported, got {other:?}"),
        }
        assert!(matches!(
            normalize(&json!({"id": "X"})),
            Err(NormalizeError::MissingTypename)
        ));
        assert!(matches!(
            normalize_item(&comment("C_1", at(1), user("a"))),
            Err(NormalizeError::Unsupported { .. })
        ));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut raw = issue("I_1", 1, at(1), user("a"));
        raw.as_object_mut().unwrap().remove("createdAt");
        let err = normalize_item(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { .. }));
        assert!(err.to_string().contains("createdAt"));
    }
}
