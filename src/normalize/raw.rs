//! GraphQL node shapes, as selected by the fragments in `github/graphql`.
//!
//! Optional fields are `Option` so that a missing selection or a `null`
//! deserializes; required fields fail the node with a serde error naming the
//! field.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{Author, AuthorKind, Label, RepoId, ReviewState, StateReason};

/// The login GitHub substitutes for deleted accounts.
const GHOST_LOGIN: &str = "ghost";

// ============================================================================
// Shared pieces
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawActor {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    login: String,
    url: Option<String>,
    avatar_url: Option<String>,
}

/// Converts an actor, treating both a missing author and the ghost account
/// as "no author".
pub(super) fn author(raw: Option<RawActor>) -> Option<Author> {
    let raw = raw.filter(|a| a.login != GHOST_LOGIN)?;
    Some(Author {
        login: raw.login,
        kind: raw
            .typename
            .as_deref()
            .map_or(AuthorKind::Other, AuthorKind::from_typename),
        url: raw.url,
        avatar_url: raw.avatar_url,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawRepoRef {
    name_with_owner: String,
}

pub(super) fn repository(raw: Option<RawRepoRef>) -> Option<RepoId> {
    raw.and_then(|r| RepoId::parse(&r.name_with_owner))
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLabel {
    name: String,
    #[serde(default)]
    color: String,
}

impl From<RawLabel> for Label {
    fn from(raw: RawLabel) -> Self {
        Label {
            name: raw.name,
            color: raw.color,
        }
    }
}

/// A GraphQL connection: `totalCount` plus one page of `nodes`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawConnection<T> {
    pub total_count: Option<u64>,
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl<T> RawConnection<T> {
    /// The non-null nodes, in order.
    pub fn into_nodes(self) -> Vec<T> {
        self.nodes.into_iter().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }
}

pub(super) fn nodes<T>(raw: Option<RawConnection<T>>) -> Vec<T> {
    raw.map(RawConnection::into_nodes).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub(super) struct RawId {
    pub id: String,
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawIssue {
    pub id: String,
    pub number: u64,
    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub state_reason: Option<StateReason>,
    pub author: Option<RawActor>,
    pub repository: Option<RawRepoRef>,
    pub labels: Option<RawConnection<RawLabel>>,
    pub comments: Option<RawConnection<RawComment>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawPullRequest {
    pub id: String,
    pub number: u64,
    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_draft: bool,
    pub author: Option<RawActor>,
    pub repository: Option<RawRepoRef>,
    pub labels: Option<RawConnection<RawLabel>>,
    pub comments: Option<RawConnection<RawComment>>,
    pub reviews: Option<RawConnection<RawReview>>,
    pub review_threads: Option<RawConnection<RawThread>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawRelease {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub tag_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_prerelease: bool,
    pub author: Option<RawActor>,
    pub repository: Option<RawRepoRef>,
}

// ============================================================================
// Children
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawComment {
    pub id: String,
    pub url: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<RawActor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawReview {
    pub id: String,
    pub url: String,
    pub body: Option<String>,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<RawActor>,
    pub comments: Option<RawConnection<RawId>>,
}

impl RawReview {
    pub fn has_comments(&self) -> bool {
        self.comments
            .as_ref()
            .is_some_and(|c| c.total_count.unwrap_or(c.len() as u64) > 0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawThread {
    #[serde(default)]
    pub is_resolved: bool,
    pub path: Option<String>,
    pub comments: Option<RawConnection<RawReviewComment>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawReviewComment {
    pub id: String,
    pub url: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<RawActor>,
    pub pull_request_review: Option<RawId>,
}
