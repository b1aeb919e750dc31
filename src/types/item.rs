//! Issues, pull requests and releases as canonical records.
//!
//! The three kinds share most of their fields (`ItemCommon`) and differ in a
//! handful of state flags (`ItemDetail`). Keeping the differences in a sum type
//! means every `match` on the detail must handle every kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{NodeId, RepoId};

/// The kind of GitHub account behind an author.
///
/// Mirrors the GraphQL `__typename` of the `Actor`, which is how bots are
/// recognised: structurally, not by login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    User,
    Bot,
    Mannequin,
    Organization,
    Other,
}

impl AuthorKind {
    /// Maps an `Actor.__typename` to a kind.
    pub fn from_typename(typename: &str) -> Self {
        match typename {
            "User" => AuthorKind::User,
            "Bot" => AuthorKind::Bot,
            "Mannequin" => AuthorKind::Mannequin,
            "Organization" => AuthorKind::Organization,
            _ => AuthorKind::Other,
        }
    }
}

/// The author of an item or comment.
///
/// Deleted accounts have no author at all: the canonical records hold
/// `Option<Author>` and `None` is the ghost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub kind: AuthorKind,
    pub url: Option<String>,
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn new(login: impl Into<String>, kind: AuthorKind) -> Self {
        Author {
            login: login.into(),
            kind,
            url: None,
            avatar_url: None,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.kind == AuthorKind::Bot
    }
}

/// An issue or pull request label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Hex color without the leading `#`, as GitHub reports it.
    pub color: String,
}

/// Discriminant of `ItemDetail`, used where only the kind matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    PullRequest,
    Release,
}

/// Why an issue was closed (GraphQL `IssueStateReason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateReason {
    Completed,
    NotPlanned,
    Reopened,
    Duplicate,
    #[serde(other)]
    Other,
}

/// Fields every item kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCommon {
    pub id: NodeId,
    /// Issue or pull request number; releases have none.
    pub number: Option<u64>,
    /// Title, or release name (falling back to the tag).
    pub title: String,
    pub url: String,
    pub author: Option<Author>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<Label>,
    pub repository: Option<RepoId>,
}

/// Kind-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDetail {
    Issue {
        closed: bool,
        state_reason: Option<StateReason>,
    },
    PullRequest {
        closed: bool,
        merged: bool,
        merged_at: Option<DateTime<Utc>>,
        draft: bool,
    },
    Release {
        tag_name: String,
        draft: bool,
        prerelease: bool,
        published_at: Option<DateTime<Utc>>,
    },
}

/// A normalized issue, pull request or release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalItem {
    #[serde(flatten)]
    pub common: ItemCommon,
    pub detail: ItemDetail,
}

impl CanonicalItem {
    pub fn id(&self) -> &NodeId {
        &self.common.id
    }

    pub fn author(&self) -> Option<&Author> {
        self.common.author.as_ref()
    }

    pub fn kind(&self) -> ItemKind {
        match self.detail {
            ItemDetail::Issue { .. } => ItemKind::Issue,
            ItemDetail::PullRequest { .. } => ItemKind::PullRequest,
            ItemDetail::Release { .. } => ItemKind::Release,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.detail {
            ItemDetail::Issue { closed, .. } | ItemDetail::PullRequest { closed, .. } => closed,
            ItemDetail::Release { .. } => false,
        }
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        match self.detail {
            ItemDetail::PullRequest { merged_at, .. } => merged_at,
            _ => None,
        }
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self.detail {
            ItemDetail::Release { published_at, .. } => published_at,
            _ => None,
        }
    }

    /// The timestamp of the item's own most recent event.
    ///
    /// Creation, closing, merging and publishing count; `updated_at` does not,
    /// because GitHub bumps it whenever a comment lands and comments are
    /// judged on their own.
    pub fn own_activity(&self) -> DateTime<Utc> {
        [self.common.closed_at, self.merged_at(), self.published_at()]
            .into_iter()
            .flatten()
            .fold(self.common.created_at, DateTime::max)
    }
}
