//! Settings for one digest run.

use super::cutoff::Cutoff;
use super::target::Target;
use crate::thread::AuthorFilter;

/// Digest-wide options; targets may override the author settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestOptions {
    pub ignore_users: Vec<String>,
    pub include_bots: bool,
    /// Abort the whole digest on the first failed target.
    pub fail_fast: bool,
}

impl DigestOptions {
    /// The author filter for a target, its own settings taking precedence.
    pub fn filter_for(&self, target: &Target) -> AuthorFilter {
        let ignore_users = target.ignore_users.as_ref().unwrap_or(&self.ignore_users);
        let include_bots = target.include_bots.unwrap_or(self.include_bots);
        AuthorFilter::new(ignore_users, include_bots)
    }
}

/// Everything needed to produce one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRequest {
    pub title: Option<String>,
    /// The `since` setting as written.
    pub since: String,
    pub cutoff: Cutoff,
    pub targets: Vec<Target>,
    pub options: DigestOptions,
}

impl DigestRequest {
    /// Keeps only targets whose label contains one of `patterns`. An empty
    /// pattern list keeps everything.
    pub fn retain_matching(&mut self, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        self.targets
            .retain(|t| patterns.iter().any(|p| t.label.contains(p.as_str())));
    }
}
