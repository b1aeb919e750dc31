//! GraphQL documents and how to find their paginated connection.
//!
//! Documents are `.graphql` files compiled into the binary. A document names
//! the fragments it needs with `# fragment: <file>` comment lines; building a
//! query appends each needed fragment file once, following references
//! transitively.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

/// Every embedded GraphQL file, by name.
const FILES: &[(&str, &str)] = &[
    ("author.graphql", include_str!("graphql/author.graphql")),
    ("comment.graphql", include_str!("graphql/comment.graphql")),
    ("issue.graphql", include_str!("graphql/issue.graphql")),
    ("pull_request.graphql", include_str!("graphql/pull_request.graphql")),
    ("release.graphql", include_str!("graphql/release.graphql")),
    ("repo_issues.graphql", include_str!("graphql/repo_issues.graphql")),
    (
        "repo_pull_requests.graphql",
        include_str!("graphql/repo_pull_requests.graphql"),
    ),
    ("repo_releases.graphql", include_str!("graphql/repo_releases.graphql")),
    (
        "org_project_items.graphql",
        include_str!("graphql/org_project_items.graphql"),
    ),
    (
        "user_project_items.graphql",
        include_str!("graphql/user_project_items.graphql"),
    ),
    ("search_items.graphql", include_str!("graphql/search_items.graphql")),
    ("issue_comments.graphql", include_str!("graphql/issue_comments.graphql")),
    (
        "pull_request_comments.graphql",
        include_str!("graphql/pull_request_comments.graphql"),
    ),
];

/// The page size written in the documents; `page_size` overrides replace it.
const DEFAULT_PAGE_MARKER: &str = "first: 100";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no GraphQL file named {0:?}")]
    UnknownFile(String),
}

/// The queries the digest runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    RepoIssues,
    RepoPullRequests,
    RepoReleases,
    OrgProjectItems,
    UserProjectItems,
    SearchItems,
    IssueComments,
    PullRequestComments,
}

impl QueryKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            QueryKind::RepoIssues => "repo_issues.graphql",
            QueryKind::RepoPullRequests => "repo_pull_requests.graphql",
            QueryKind::RepoReleases => "repo_releases.graphql",
            QueryKind::OrgProjectItems => "org_project_items.graphql",
            QueryKind::UserProjectItems => "user_project_items.graphql",
            QueryKind::SearchItems => "search_items.graphql",
            QueryKind::IssueComments => "issue_comments.graphql",
            QueryKind::PullRequestComments => "pull_request_comments.graphql",
        }
    }

    /// Path from `data` to the connection object holding `pageInfo`.
    pub fn connection(&self) -> &'static [&'static str] {
        match self {
            QueryKind::RepoIssues => &["repository", "issues"],
            QueryKind::RepoPullRequests => &["repository", "pullRequests"],
            QueryKind::RepoReleases => &["repository", "releases"],
            QueryKind::OrgProjectItems => &["organization", "projectV2", "items"],
            QueryKind::UserProjectItems => &["user", "projectV2", "items"],
            QueryKind::SearchItems => &["search"],
            QueryKind::IssueComments => &["repository", "issue", "comments"],
            QueryKind::PullRequestComments => &["repository", "pullRequest", "comments"],
        }
    }
}

/// How a query's paginated connection is located in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Connection {
    Path(&'static [&'static str]),
    /// The first object (depth-first, not looking inside lists) that has a
    /// `pageInfo` key. Used for ad-hoc documents.
    Discover,
}

/// A ready-to-send GraphQL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    connection: Connection,
}

impl Query {
    /// Builds one of the digest's queries, optionally with a smaller page
    /// size to force pagination.
    pub fn build(kind: QueryKind, page_size: Option<u32>) -> Result<Self, QueryError> {
        Ok(Self {
            text: build_query(kind.file_name(), page_size)?,
            connection: Connection::Path(kind.connection()),
        })
    }

    /// Wraps a user-supplied document.
    pub fn adhoc(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            connection: Connection::Discover,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The operation name (`getRepoIssues`), or `query` for anonymous
    /// documents.
    pub fn operation_name(&self) -> &str {
        let head = self.head_line();
        let rest = head
            .strip_prefix("query")
            .or_else(|| head.strip_prefix("mutation"))
            .unwrap_or("");
        let name = rest
            .trim_start()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .unwrap_or("");
        if name.is_empty() { "query" } else { name }
    }

    /// One line for logs and error messages: the operation and its
    /// variables.
    pub fn synopsis(&self, variables: &Map<String, Value>) -> String {
        let args = variables
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.operation_name(), args)
    }

    /// Finds the paginated connection object in a response's `data`.
    pub fn connection_in<'v>(&self, data: &'v Value) -> Option<&'v Map<String, Value>> {
        match &self.connection {
            Connection::Path(path) => path
                .iter()
                .try_fold(data, |value, key| value.get(key))
                .and_then(Value::as_object),
            Connection::Discover => find_object_with_key(data, "pageInfo"),
        }
    }

    fn head_line(&self) -> &str {
        self.text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .unwrap_or("")
    }
}

fn embedded(name: &str) -> Result<&'static str, QueryError> {
    FILES
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, text)| *text)
        .ok_or_else(|| QueryError::UnknownFile(name.to_string()))
}

/// Reads an embedded GraphQL file and completes it with the fragments it
/// requests.
pub fn build_query(file_name: &str, page_size: Option<u32>) -> Result<String, QueryError> {
    let mut parts = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([file_name]);
    let mut pending = vec![file_name.to_string()];

    while !pending.is_empty() {
        let mut next = Vec::new();
        for name in pending {
            let text = embedded(&name)?;
            parts.push(text);
            for fragment in fragment_references(text) {
                if seen.insert(fragment) {
                    next.push(fragment.to_string());
                }
            }
        }
        pending = next;
    }

    let full = parts.join("\n");
    Ok(match page_size {
        Some(size) => full.replace(DEFAULT_PAGE_MARKER, &format!("first: {size}")),
        None => full,
    })
}

/// The file names listed in `# fragment: <file>` lines.
fn fragment_references(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter_map(|line| {
        let rest = line.trim().strip_prefix('#')?.trim_start();
        let name = rest.strip_prefix("fragment:")?.trim();
        (!name.is_empty()).then_some(name)
    })
}

/// Returns the first object in `value` (itself included) that has `key`.
///
/// Only objects are searched; lists are not descended into, so a nested
/// connection inside a node never shadows the top-level one.
pub fn find_object_with_key<'v>(value: &'v Value, key: &str) -> Option<&'v Map<String, Value>> {
    let object = value.as_object()?;
    if object.contains_key(key) {
        return Some(object);
    }
    object
        .values()
        .filter(|v| v.is_object())
        .find_map(|v| find_object_with_key(v, key))
}
