//! Turning targets into a digest.
//!
//! `DigestBuilder` produces one `Container` per `Target`; `DigestSet` runs
//! every target of a digest and gathers the containers into a
//! `DigestPayload` for the renderer.

pub mod builder;
pub mod container;
pub mod cutoff;
pub mod options;
pub mod set;
pub mod target;


pub use builder::{BuildError, DigestBuilder, search_url};
pub use container::{Container, ContainerKind, DigestPayload, FailedTarget, ItemEntry, Reasons};
pub use cutoff::{Cutoff, SinceError, parse_duration, parse_since};
pub use options::{DigestOptions, DigestRequest};
pub use set::{DigestSet, RunError};
pub use target::{ProjectOwner, RepoStreams, Target, TargetError, TargetSource};
