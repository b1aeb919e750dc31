//! Who gets left out of a digest.

use std::collections::HashSet;

use crate::types::Author;

/// Decides whether an author's items and comments are shown.
///
/// A missing author (a deleted account) is always admitted: there is no
/// login to match against the ignore list and no account type to call a bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilter {
    /// Lower-cased logins; GitHub logins are case-insensitive.
    ignore_users: HashSet<String>,
    include_bots: bool,
}

impl AuthorFilter {
    pub fn new<I, S>(ignore_users: I, include_bots: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignore_users: ignore_users
                .into_iter()
                .map(|login| login.as_ref().to_lowercase())
                .collect(),
            include_bots,
        }
    }

    pub fn admits(&self, author: Option<&Author>) -> bool {
        let Some(author) = author else {
            return true;
        };
        if author.is_bot() && !self.include_bots {
            return false;
        }
        !self.ignore_users.contains(&author.login.to_lowercase())
    }
}
