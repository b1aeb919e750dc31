//! Building one container from one target.
//!
//! # Flow
//!
//! 1. Resolve the target into its listings and pull their pages
//!    (a repository's issues, pull requests and releases run concurrently)
//! 2. Normalize every node; the first node with a given id wins
//! 3. Drop items whose author is ignored, or a bot when bots are excluded
//! 4. Fetch the rest of the comments for items whose first page was short
//! 5. Assemble each item's thread and drop items that turn out boring
//! 6. Sort newest activity first
//!
//! Pull requests and releases are listed newest first, so their listings
//! stop as soon as a page ends before the cutoff. Issues are filtered by the
//! API itself (`filterBy: {since}`).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::container::{Container, ContainerKind, ItemEntry};
use super::cutoff::Cutoff;
use super::target::{ProjectOwner, RepoStreams, Target, TargetSource};
use crate::github::{FetchError, GraphqlTransport, Listing, PagedFetcher, Query, QueryError, QueryKind};
use crate::normalize::{self, NormalizeError, NormalizedItem};
use crate::thread::{AuthorFilter, assemble_item};
use crate::types::{ItemKind, RepoId};

/// Where the web search for a container's query lives.
const SEARCH_URL: &str = "https://github.com/search";

/// Error type for a failed container build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("can't normalize node: {0}")]
    Normalize(#[from] NormalizeError),
}

/// Every query the builder runs, built once.
#[derive(Debug)]
struct Queries {
    repo_issues: Query,
    repo_pull_requests: Query,
    repo_releases: Query,
    org_project_items: Query,
    user_project_items: Query,
    search_items: Query,
    issue_comments: Query,
    pull_request_comments: Query,
}

impl Queries {
    fn build(page_size: Option<u32>) -> Result<Self, QueryError> {
        Ok(Self {
            repo_issues: Query::build(QueryKind::RepoIssues, page_size)?,
            repo_pull_requests: Query::build(QueryKind::RepoPullRequests, page_size)?,
            repo_releases: Query::build(QueryKind::RepoReleases, page_size)?,
            org_project_items: Query::build(QueryKind::OrgProjectItems, page_size)?,
            user_project_items: Query::build(QueryKind::UserProjectItems, page_size)?,
            search_items: Query::build(QueryKind::SearchItems, page_size)?,
            issue_comments: Query::build(QueryKind::IssueComments, page_size)?,
            pull_request_comments: Query::build(QueryKind::PullRequestComments, page_size)?,
        })
    }
}

/// Builds containers through a shared fetcher.
pub struct DigestBuilder<T> {
    fetcher: Arc<PagedFetcher<T>>,
    queries: Queries,
}

impl<T: GraphqlTransport> DigestBuilder<T> {
    /// `page_size` overrides the page size of every listing (for testing
    /// pagination against the real API).
    pub fn new(fetcher: Arc<PagedFetcher<T>>, page_size: Option<u32>) -> Result<Self, QueryError> {
        Ok(Self {
            fetcher,
            queries: Queries::build(page_size)?,
        })
    }

    pub fn fetcher(&self) -> &Arc<PagedFetcher<T>> {
        &self.fetcher
    }

    #[instrument(skip_all, fields(target = %target.label))]
    pub async fn build(
        &self,
        target: &Target,
        cutoff: &Cutoff,
        filter: &AuthorFilter,
    ) -> Result<Container, BuildError> {
        let (mut container, nodes) = match &target.source {
            TargetSource::Repo { repo, streams } => self.repo_nodes(repo, *streams, cutoff).await?,
            TargetSource::Project {
                owner,
                login,
                number,
            } => self.project_nodes(*owner, login, *number).await?,
            TargetSource::Search { query } => self.search_nodes(query, cutoff).await?,
        };
        if let Some(title) = &target.title {
            container.title = title.clone();
        }
        debug!(nodes = nodes.len(), "Fetched listings");

        let items = unique_items(&nodes, filter)?;
        let items = try_join_all(
            items
                .into_iter()
                .map(|item| self.complete_comments(item, cutoff)),
        )
        .await?;

        container.entries = items
            .into_iter()
            .filter_map(|n| {
                let thread = assemble_item(n.item, n.children, cutoff, filter);
                (!thread.boring).then(|| ItemEntry::new(thread, cutoff, target.home_repo.as_ref()))
            })
            .collect();
        container.sort_entries();

        info!(items = container.entries.len(), "Built container");
        Ok(container)
    }

    // ─── Listings ─────────────────────────────────────────────────────────────

    async fn repo_nodes(
        &self,
        repo: &RepoId,
        streams: RepoStreams,
        cutoff: &Cutoff,
    ) -> Result<(Container, Vec<Value>), BuildError> {
        let issues = async {
            if !streams.issues {
                return Ok(Listing::default());
            }
            let mut vars = repo_variables(repo);
            vars.insert("since".to_string(), cutoff.query_variable());
            self.fetcher.pages(&self.queries.repo_issues, vars).collect().await
        };
        let pulls = async {
            if !streams.pull_requests {
                return Ok(Listing::default());
            }
            let order = NewestFirst::by("updatedAt");
            self.collect_newest(&self.queries.repo_pull_requests, repo_variables(repo), order, cutoff)
                .await
        };
        let releases = async {
            if !streams.releases {
                return Ok(Listing::default());
            }
            // Listed by creation, but a draft counts from when it's published.
            let order = NewestFirst::by("createdAt").also("publishedAt");
            self.collect_newest(&self.queries.repo_releases, repo_variables(repo), order, cutoff)
                .await
        };
        let (issues, pulls, releases) = tokio::try_join!(issues, pulls, releases)?;

        let data = [&issues, &pulls, &releases]
            .into_iter()
            .find_map(|listing| listing.data.as_ref());
        let field = |pointer: &str| {
            data.and_then(|d| d.pointer(pointer))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let container = Container {
            title: field("/repository/nameWithOwner").unwrap_or_else(|| repo.to_string()),
            url: field("/repository/url").unwrap_or_else(|| format!("https://github.com/{repo}")),
            kind: ContainerKind::Repo,
            entries: Vec::new(),
        };

        let mut nodes = issues.nodes;
        nodes.extend(pulls.nodes);
        nodes.extend(releases.nodes);
        Ok((container, nodes))
    }

    async fn project_nodes(
        &self,
        owner: ProjectOwner,
        login: &str,
        number: u64,
    ) -> Result<(Container, Vec<Value>), BuildError> {
        let (query, root) = match owner {
            ProjectOwner::Organization => (&self.queries.org_project_items, "organization"),
            ProjectOwner::User => (&self.queries.user_project_items, "user"),
        };
        let mut vars = Map::new();
        vars.insert("owner".to_string(), json!(login));
        vars.insert("projectNumber".to_string(), json!(number));
        let listing = self.fetcher.pages(query, vars).collect().await?;

        let project = listing
            .data
            .as_ref()
            .and_then(|d| d.get(root))
            .and_then(|o| o.get("projectV2"));
        let field = |key: &str| project.and_then(|p| p.get(key)).and_then(Value::as_str);
        let container = Container {
            title: field("title").unwrap_or(login).to_string(),
            url: field("url").map_or_else(
                || format!("https://github.com/{root}s/{login}/projects/{number}"),
                str::to_string,
            ),
            kind: ContainerKind::Project,
            entries: Vec::new(),
        };

        let nodes = listing
            .nodes
            .into_iter()
            .filter_map(|card| match card.get("content") {
                None | Some(Value::Null) => None,
                Some(content) if normalize::typename(content) == Some("DraftIssue") => {
                    debug!("Skipping draft issue card");
                    None
                }
                Some(content) => Some(content.clone()),
            })
            .collect();
        Ok((container, nodes))
    }

    async fn search_nodes(
        &self,
        query: &str,
        cutoff: &Cutoff,
    ) -> Result<(Container, Vec<Value>), BuildError> {
        let full_query = match cutoff.search_term() {
            Some(term) => format!("{query} {term}"),
            None => query.to_string(),
        };
        let mut vars = Map::new();
        vars.insert("query".to_string(), json!(full_query));
        let listing = self.fetcher.pages(&self.queries.search_items, vars).collect().await?;

        let container = Container {
            title: query.to_string(),
            url: search_url(&full_query),
            kind: ContainerKind::Search,
            entries: Vec::new(),
        };
        Ok((container, listing.nodes))
    }

    /// Pulls a newest-first listing until a page ends before the cutoff.
    async fn collect_newest(
        &self,
        query: &Query,
        variables: Map<String, Value>,
        order: NewestFirst,
        cutoff: &Cutoff,
    ) -> Result<Listing, FetchError> {
        let mut pages = self.fetcher.pages(query, variables);
        let mut listing = Listing::default();
        while let Some(page) = pages.next_page().await? {
            let done = order.ends_before(&page.nodes, cutoff);
            listing.nodes.extend(page.nodes);
            if listing.data.is_none() {
                listing.data = Some(page.data);
            }
            if done {
                debug!(query = query.operation_name(), "Listing reached the cutoff");
                break;
            }
        }
        Ok(listing)
    }

    // ─── Items ────────────────────────────────────────────────────────────────

    /// Replaces a short first page of comments with the complete list.
    ///
    /// Items not updated since the cutoff can't have new comments, so their
    /// comments are left as they are.
    async fn complete_comments(
        &self,
        mut normalized: NormalizedItem,
        cutoff: &Cutoff,
    ) -> Result<NormalizedItem, BuildError> {
        let common = &normalized.item.common;
        if !normalized.comments.is_incomplete() || !cutoff.includes(common.updated_at) {
            return Ok(normalized);
        }
        let (Some(number), Some(repo)) = (common.number, common.repository.as_ref()) else {
            return Ok(normalized);
        };
        let query = match normalized.item.kind() {
            ItemKind::Issue => &self.queries.issue_comments,
            ItemKind::PullRequest => &self.queries.pull_request_comments,
            ItemKind::Release => return Ok(normalized),
        };

        let mut vars = repo_variables(repo);
        vars.insert("number".to_string(), json!(number));
        let listing = self.fetcher.pages(query, vars).collect().await?;
        let comments = listing
            .nodes
            .iter()
            .map(normalize::normalize_comment)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(item = %normalized.item.id(), comments = comments.len(), "Fetched remaining comments");
        normalized.replace_comments(comments);
        Ok(normalized)
    }
}

/// Normalizes listing nodes, keeping the first of each id and dropping
/// unwanted authors.
fn unique_items(nodes: &[Value], filter: &AuthorFilter) -> Result<Vec<NormalizedItem>, BuildError> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for raw in nodes {
        let normalized = normalize::normalize_item(raw)?;
        if !seen.insert(normalized.item.id().clone()) {
            debug!(id = %normalized.item.id(), "Skipping duplicate item");
            continue;
        }
        if !filter.admits(normalized.item.author()) {
            debug!(id = %normalized.item.id(), "Skipping item by filtered author");
            continue;
        }
        items.push(normalized);
    }
    Ok(items)
}

fn repo_variables(repo: &RepoId) -> Map<String, Value> {
    let mut vars = Map::new();
    vars.insert("owner".to_string(), json!(repo.owner));
    vars.insert("name".to_string(), json!(repo.repo));
    vars
}

/// How a listing is sorted, newest first, and which other timestamps can
/// still put an older node inside the window.
#[derive(Debug, Clone, Copy)]
struct NewestFirst {
    order: &'static str,
    activity: Option<&'static str>,
}

impl NewestFirst {
    fn by(order: &'static str) -> Self {
        Self { order, activity: None }
    }

    fn also(self, activity: &'static str) -> Self {
        Self {
            activity: Some(activity),
            ..self
        }
    }

    /// True when the last node's ordering field predates the cutoff and no
    /// node that old on the page has activity inside the window.
    fn ends_before(&self, nodes: &[Value], cutoff: &Cutoff) -> bool {
        let Some(cutoff) = cutoff.instant() else {
            return false;
        };
        let before = |node: &Value, field: &str| {
            node.get(field)
                .and_then(Value::as_str)
                .and_then(|text| text.parse::<DateTime<Utc>>().ok())
                .is_some_and(|t| t < cutoff)
        };
        let last_is_old = nodes.last().is_some_and(|node| before(node, self.order));
        let late_activity = self.activity.is_some_and(|field| {
            nodes.iter().any(|node| {
                before(node, self.order)
                    && node.get(field).is_some_and(|v| !v.is_null())
                    && !before(node, field)
            })
        });
        last_is_old && !late_activity
    }
}

/// The GitHub web search page for a query.
pub fn search_url(query: &str) -> String {
    format!("{SEARCH_URL}?q={}&type=issues", urlencoding::encode(query))
}
