//! Comments and reviews as canonical records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::NodeId;
use super::item::Author;

/// What kind of entity a child record was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    /// A conversation comment on an issue or pull request.
    Comment,
    /// A pull request review (its body or bare verdict).
    Review,
    /// A comment attached to code in a review thread.
    ReviewComment,
}

/// A review verdict (GraphQL `PullRequestReviewState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
}

/// Review-thread facts carried by the first comment of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub is_resolved: bool,
    /// The file the thread is attached to.
    pub path: Option<String>,
}

/// A normalized comment or review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalChild {
    pub id: NodeId,
    pub kind: ChildKind,
    pub author: Option<Author>,
    pub body: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The verdict of the review this child belongs to, when known.
    pub review_state: Option<ReviewState>,
    /// Present only on review-thread roots.
    pub thread: Option<ThreadInfo>,
}

impl CanonicalChild {
    pub fn author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    /// The instant compared against the cutoff: the last edit, so a comment
    /// revised inside the window counts as recent activity.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }
}
