//! Core domain types for the digest.
//!
//! Normalized records are created once by `normalize` and are immutable
//! afterwards; the thread tree and containers wrap them.

pub mod child;
pub mod ids;
pub mod item;

pub use child::{CanonicalChild, ChildKind, ReviewState, ThreadInfo};
pub use ids::{NodeId, RepoId};
pub use item::{
    Author, AuthorKind, CanonicalItem, ItemCommon, ItemDetail, ItemKind, Label, StateReason,
};
