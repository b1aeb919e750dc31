//! Turning an item and its flat list of children into a tree.
//!
//! # Flags
//!
//! Every node carries two flags:
//! - `included`: the node's own timestamp is inside the cutoff window
//! - `boring`: the node is not included and neither is anything below it
//!
//! So a node older than the cutoff stays un-boring exactly when something
//! newer hangs beneath it and needs it for context. Nodes are never removed
//! for being old, only flagged; the renderer decides how to show them.
//!
//! # Removal
//!
//! Nodes are removed for four reasons, each taking its replies with it:
//! - the author is ignored, or is a bot while bots are excluded
//! - a second record with an id already seen (the first one wins)
//! - the declared parent does not exist (an orphan, logged)

mod filter;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::digest::Cutoff;
use crate::normalize::ChildRecord;
use crate::types::{CanonicalChild, CanonicalItem, NodeId};

pub use filter::AuthorFilter;

/// What a node wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum ThreadEntry {
    Item(Box<CanonicalItem>),
    Child(CanonicalChild),
}

impl ThreadEntry {
    pub fn id(&self) -> &NodeId {
        match self {
            ThreadEntry::Item(item) => item.id(),
            ThreadEntry::Child(child) => &child.id,
        }
    }
}

/// A node in an assembled thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadNode {
    pub entry: ThreadEntry,
    /// The instant compared against the cutoff.
    pub timestamp: DateTime<Utc>,
    pub included: bool,
    pub boring: bool,
    /// Chronological, oldest first.
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    fn new(entry: ThreadEntry, timestamp: DateTime<Utc>, cutoff: &Cutoff, children: Vec<ThreadNode>) -> Self {
        let included = cutoff.includes(timestamp);
        let boring = !included && children.iter().all(|c| c.boring);
        Self {
            entry,
            timestamp,
            included,
            boring,
            children,
        }
    }

    pub fn id(&self) -> &NodeId {
        self.entry.id()
    }

    pub fn item(&self) -> Option<&CanonicalItem> {
        match &self.entry {
            ThreadEntry::Item(item) => Some(item),
            ThreadEntry::Child(_) => None,
        }
    }

    /// The newest included timestamp in this subtree, or `None` when the
    /// whole subtree is boring.
    pub fn latest_included(&self) -> Option<DateTime<Utc>> {
        let own = self.included.then_some(self.timestamp);
        self.children
            .iter()
            .filter_map(ThreadNode::latest_included)
            .chain(own)
            .max()
    }

    /// Total number of nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ThreadNode::node_count).sum::<usize>()
    }

    /// Depth-first, parents before children.
    pub fn iter(&self) -> impl Iterator<Item = &ThreadNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Builds the tree for one item: the item is the root, its children below.
pub fn assemble_item(
    item: CanonicalItem,
    children: Vec<ChildRecord>,
    cutoff: &Cutoff,
    filter: &AuthorFilter,
) -> ThreadNode {
    let timestamp = item.own_activity();
    let children = assemble(children, cutoff, filter);
    ThreadNode::new(ThreadEntry::Item(Box::new(item)), timestamp, cutoff, children)
}

/// Builds the forest of an item's children, oldest first at every level.
pub fn assemble(records: Vec<ChildRecord>, cutoff: &Cutoff, filter: &AuthorFilter) -> Vec<ThreadNode> {
    let mut arena = Arena::default();
    for record in records {
        arena.insert(record);
    }
    arena.link();
    let roots = arena.roots.clone();
    let nodes = sort_chronologically(
        roots
            .into_iter()
            .filter_map(|idx| arena.build(idx, cutoff, filter))
            .collect(),
    );
    for (id, parent) in arena.unreachable() {
        warn!(%id, ?parent, "Dropping comment caught in a parent cycle");
    }
    nodes
}

fn sort_chronologically(mut nodes: Vec<ThreadNode>) -> Vec<ThreadNode> {
    nodes.sort_by(|a, b| (a.timestamp, a.id()).cmp(&(b.timestamp, b.id())));
    nodes
}

/// Flat storage for children, linked by parent index.
#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    index: HashMap<NodeId, usize>,
    roots: Vec<usize>,
}

struct Slot {
    child: Option<CanonicalChild>,
    parent: Option<NodeId>,
    kids: Vec<usize>,
}

impl Arena {
    fn insert(&mut self, record: ChildRecord) {
        if self.index.contains_key(&record.child.id) {
            debug!(id = %record.child.id, "Dropping duplicate child");
            return;
        }
        self.index.insert(record.child.id.clone(), self.slots.len());
        self.slots.push(Slot {
            child: Some(record.child),
            parent: record.parent,
            kids: Vec::new(),
        });
    }

    fn link(&mut self) {
        let mut orphans = Vec::new();
        for idx in 0..self.slots.len() {
            let parent = self.slots[idx].parent.clone();
            match parent {
                None => self.roots.push(idx),
                Some(parent_id) => match self.index.get(&parent_id) {
                    Some(&p) if p != idx => self.slots[p].kids.push(idx),
                    _ => {
                        warn!(
                            id = ?self.slots[idx].child.as_ref().map(|c| c.id.to_string()),
                            parent = %parent_id,
                            "Dropping comment whose parent is missing"
                        );
                        orphans.push(idx);
                    }
                },
            }
        }
        for idx in orphans {
            self.discard(idx);
        }
    }

    /// Empties a slot and everything hanging under it.
    fn discard(&mut self, idx: usize) {
        if self.slots[idx].child.take().is_none() {
            return;
        }
        for kid in std::mem::take(&mut self.slots[idx].kids) {
            self.discard(kid);
        }
    }

    /// Children never reached from a root: their parent links lead into a cycle.
    fn unreachable(&self) -> Vec<(&NodeId, Option<&NodeId>)> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let child = slot.child.as_ref()?;
                Some((&child.id, slot.parent.as_ref()))
            })
            .collect()
    }

    /// Moves a slot and its admitted descendants out of the arena.
    ///
    /// Each slot is taken at most once, so a parent cycle in the input ends
    /// the walk instead of looping.
    fn build(&mut self, idx: usize, cutoff: &Cutoff, filter: &AuthorFilter) -> Option<ThreadNode> {
        let child = self.slots[idx].child.take()?;
        let kids = std::mem::take(&mut self.slots[idx].kids);
        if !filter.admits(child.author()) {
            debug!(id = %child.id, "Dropping filtered child and its replies");
            for kid in kids {
                self.discard(kid);
            }
            return None;
        }
        let children = sort_chronologically(
            kids.into_iter()
                .filter_map(|k| self.build(k, cutoff, filter))
                .collect(),
        );
        let timestamp = child.timestamp();
        Some(ThreadNode::new(ThreadEntry::Child(child), timestamp, cutoff, children))
    }
}
