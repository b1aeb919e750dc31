//! The assembled digest, as handed to the renderer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cutoff::Cutoff;
use crate::thread::ThreadNode;
use crate::types::{CanonicalItem, NodeId, RepoId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Project,
    Repo,
    Search,
}

/// Which of the item's own events fall inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Reasons {
    pub created: bool,
    pub closed: bool,
    pub merged: bool,
}

impl Reasons {
    pub fn for_item(item: &CanonicalItem, cutoff: &Cutoff) -> Self {
        let within = |t: Option<DateTime<Utc>>| t.is_some_and(|t| cutoff.includes(t));
        Self {
            created: cutoff.includes(item.common.created_at),
            closed: within(item.common.closed_at),
            merged: within(item.merged_at()),
        }
    }
}

/// One top-level item of a container with its thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemEntry {
    /// The item is the root; comments and reviews hang below.
    pub thread: ThreadNode,
    /// Set for project items living outside the project's home repository.
    pub other_repo: bool,
    pub reasons: Reasons,
    /// The newest included timestamp in the thread; entries are sorted on it.
    pub latest_activity: DateTime<Utc>,
}

impl ItemEntry {
    pub fn id(&self) -> &NodeId {
        self.thread.id()
    }

    pub fn item(&self) -> Option<&CanonicalItem> {
        self.thread.item()
    }

    pub(super) fn new(thread: ThreadNode, cutoff: &Cutoff, home_repo: Option<&RepoId>) -> Self {
        let item = thread.item();
        let other_repo = match (home_repo, item) {
            (Some(home), Some(item)) => item.common.repository.as_ref() != Some(home),
            _ => false,
        };
        let reasons = item
            .map(|item| Reasons::for_item(item, cutoff))
            .unwrap_or_default();
        let latest_activity = thread.latest_included().unwrap_or(thread.timestamp);
        Self {
            thread,
            other_repo,
            reasons,
            latest_activity,
        }
    }
}

/// The results for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub title: String,
    pub url: String,
    pub kind: ContainerKind,
    /// Newest activity first.
    pub entries: Vec<ItemEntry>,
}

impl Container {
    /// Orders entries newest activity first; ties go to the smaller id so
    /// the order never depends on fetch interleaving.
    pub(super) fn sort_entries(&mut self) {
        self.entries.sort_by(|a, b| {
            b.latest_activity
                .cmp(&a.latest_activity)
                .then_with(|| a.id().cmp(b.id()))
        });
    }
}

/// A target that could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
    pub target: String,
    pub error: String,
}

/// Everything one digest run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestPayload {
    pub title: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// The `since` setting as written.
    pub since: String,
    /// The cutoff it resolved to, described for humans.
    pub since_description: String,
    pub cutoff: Cutoff,
    /// In configuration order.
    pub containers: Vec<Container>,
    pub failures: Vec<FailedTarget>,
}

impl DigestPayload {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
