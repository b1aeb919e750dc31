//! gh-digest - summarise recent GitHub issue, pull request and release
//! activity into structured digests.
//!
//! The library holds the fetch-and-assemble engine: a paginated,
//! rate-limit-aware GraphQL client (`github`), normalization of raw nodes
//! (`normalize`), thread assembly with cutoff marking (`thread`) and the
//! per-target and per-digest drivers (`digest`).

pub mod cli;
pub mod config;
pub mod digest;
pub mod github;
pub mod normalize;
pub mod output;
pub mod thread;
pub mod types;

#[cfg(test)]
pub mod test_utils;
