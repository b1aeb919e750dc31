//! Shared test utilities: a controllable clock, a scripted transport and
//! builders for GraphQL node fixtures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use crate::github::{ApiError, Clock, GraphqlRequest, GraphqlTransport, Query, RawResponse};

// ─── Time ─────────────────────────────────────────────────────────────────────

/// Noon UTC on the given day of March 2024.
pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

/// "Now" for scenario tests: noon on 15 March 2024.
pub fn epoch() -> DateTime<Utc> {
    at(15)
}

/// A wall clock that moves with tokio's (possibly paused) clock.
#[derive(Debug)]
pub struct PausedClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap_or_default()
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// A request as the scripted transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub after: Option<String>,
    pub variables: Map<String, Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Route {
    operation: String,
    after: Option<String>,
    /// Variables that must match (besides `after`); empty matches anything.
    variables: Map<String, Value>,
    responses: VecDeque<RawResponse>,
}

impl Route {
    fn matches(&self, operation: &str, after: Option<&str>, variables: &Map<String, Value>) -> bool {
        self.operation == operation
            && self.after.as_deref() == after
            && self
                .variables
                .iter()
                .all(|(k, v)| variables.get(k) == Some(v))
    }
}

/// An in-memory transport answering from a script.
///
/// Responses are matched by operation name, `after` cursor and optionally
/// some variables. Each route answers its responses in order and repeats the
/// last one once the others are used up. Unscripted requests fail with a
/// permanent error naming the request.
#[derive(Debug)]
pub struct ScriptedTransport {
    clock: Arc<dyn Clock>,
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, operation: &str, after: Option<&str>, response: RawResponse) {
        self.respond_matching(operation, after, json!({}), response);
    }

    /// Scripts a response for requests whose variables include `variables`.
    pub fn respond_matching(
        &self,
        operation: &str,
        after: Option<&str>,
        variables: Value,
        response: RawResponse,
    ) {
        let variables = match variables {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|r| {
            r.operation == operation && r.after.as_deref() == after && r.variables == variables
        }) {
            route.responses.push_back(response);
            return;
        }
        routes.push(Route {
            operation: operation.to_string(),
            after: after.map(str::to_string),
            variables,
            responses: VecDeque::from([response]),
        });
    }

    /// Scripts a successful response carrying `data`.
    pub fn respond_ok(&self, operation: &str, after: Option<&str>, data: Value) {
        self.respond(operation, after, ok_response(data));
    }

    pub fn respond_ok_matching(&self, operation: &str, after: Option<&str>, variables: Value, data: Value) {
        self.respond_matching(operation, after, variables, ok_response(data));
    }

    /// Scripts a bare HTTP failure.
    pub fn respond_status(&self, operation: &str, after: Option<&str>, status: u16) {
        self.respond(
            operation,
            after,
            RawResponse {
                status,
                rate_limit: None,
                body: Value::String(format!("HTTP {status}")),
            },
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }
}

impl GraphqlTransport for ScriptedTransport {
    async fn send(&self, request: &GraphqlRequest) -> Result<RawResponse, ApiError> {
        let operation = Query::adhoc(request.query.clone()).operation_name().to_string();
        let after = request
            .variables
            .get("after")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.calls.lock().unwrap().push(RecordedCall {
            operation: operation.clone(),
            after: after.clone(),
            variables: request.variables.clone(),
            at: self.clock.now(),
        });

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| r.matches(&operation, after.as_deref(), &request.variables))
            .ok_or_else(|| {
                ApiError::permanent(format!(
                    "no scripted response for {operation} after {after:?} with {}",
                    Value::Object(request.variables.clone())
                ))
            })?;
        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        response.ok_or_else(|| ApiError::permanent("empty route"))
    }
}

pub fn ok_response(data: Value) -> RawResponse {
    RawResponse {
        status: 200,
        rate_limit: None,
        body: json!({ "data": data }),
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

pub fn user(login: &str) -> Value {
    json!({
        "__typename": "User",
        "login": login,
        "url": format!("https://github.com/{login}"),
        "avatarUrl": format!("https://avatars.githubusercontent.com/{login}"),
    })
}

pub fn bot(login: &str) -> Value {
    json!({
        "__typename": "Bot",
        "login": login,
        "url": format!("https://github.com/apps/{login}"),
        "avatarUrl": null,
    })
}

/// A connection with no further pages.
pub fn connection(nodes: Vec<Value>) -> Value {
    connection_page(nodes, None)
}

/// One page of a connection; `next` is the cursor of the following page.
pub fn connection_page(nodes: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "totalCount": nodes.len(),
        "pageInfo": {"hasNextPage": next.is_some(), "endCursor": next},
        "nodes": nodes,
    })
}

/// An issue in `o/r`, last updated when it was created, with no comments.
pub fn issue(id: &str, number: u64, created: DateTime<Utc>, author: Value) -> Value {
    json!({
        "__typename": "Issue",
        "id": id,
        "number": number,
        "url": format!("https://github.com/o/r/issues/{number}"),
        "title": format!("Issue {number}"),
        "body": "",
        "createdAt": created,
        "updatedAt": created,
        "closed": false,
        "closedAt": null,
        "stateReason": null,
        "author": author,
        "repository": {"nameWithOwner": "o/r"},
        "labels": {"nodes": []},
        "comments": connection(Vec::new()),
    })
}

/// A pull request in `o/r` with no comments or reviews.
pub fn pull_request(id: &str, number: u64, created: DateTime<Utc>, author: Value) -> Value {
    json!({
        "__typename": "PullRequest",
        "id": id,
        "number": number,
        "url": format!("https://github.com/o/r/pull/{number}"),
        "title": format!("Pull request {number}"),
        "body": "",
        "createdAt": created,
        "updatedAt": created,
        "closed": false,
        "closedAt": null,
        "merged": false,
        "mergedAt": null,
        "isDraft": false,
        "author": author,
        "repository": {"nameWithOwner": "o/r"},
        "labels": {"nodes": []},
        "comments": connection(Vec::new()),
        "reviews": connection(Vec::new()),
        "reviewThreads": connection(Vec::new()),
    })
}

/// A published release of `o/r`.
pub fn release(id: &str, tag: &str, created: DateTime<Utc>, author: Value) -> Value {
    json!({
        "__typename": "Release",
        "id": id,
        "url": format!("https://github.com/o/r/releases/tag/{tag}"),
        "name": tag,
        "tagName": tag,
        "description": "",
        "createdAt": created,
        "updatedAt": created,
        "publishedAt": created,
        "isDraft": false,
        "isPrerelease": false,
        "author": author,
        "repository": {"nameWithOwner": "o/r"},
    })
}

pub fn comment(id: &str, created: DateTime<Utc>, author: Value) -> Value {
    json!({
        "__typename": "IssueComment",
        "id": id,
        "url": format!("https://github.com/o/r/issues/1#{id}"),
        "body": format!("comment {id}"),
        "createdAt": created,
        "updatedAt": created,
        "author": author,
    })
}

/// Adds comments to an issue or pull request fixture, bumping its
/// `updatedAt` to the newest one.
pub fn with_comments(mut item: Value, comments: Vec<Value>) -> Value {
    let newest = comments
        .iter()
        .filter_map(|c| c["updatedAt"].as_str())
        .max()
        .map(str::to_string);
    if let Some(newest) = newest
        && item["updatedAt"].as_str().is_some_and(|u| u < newest.as_str())
    {
        item["updatedAt"] = json!(newest);
    }
    item["comments"] = connection(comments);
    item
}

/// `data` for one page of `getRepoIssues` (or pull requests/releases, by
/// `field`).
pub fn repo_page(field: &str, nodes: Vec<Value>, next: Option<&str>) -> Value {
    let mut repository = json!({
        "id": "R_1",
        "url": "https://github.com/o/r",
        "nameWithOwner": "o/r",
    });
    repository[field] = connection_page(nodes, next);
    json!({ "repository": repository })
}

/// `data` for one page of `getSearchItems`.
pub fn search_page(nodes: Vec<Value>, next: Option<&str>) -> Value {
    let mut page = connection_page(nodes, next);
    if let Some(map) = page.as_object_mut()
        && let Some(count) = map.remove("totalCount")
    {
        map.insert("issueCount".to_string(), count);
    }
    json!({ "search": page })
}

/// `data` for one page of `getOrgProjectItems`; `contents` are wrapped as
/// project cards.
pub fn org_project_page(title: &str, contents: Vec<Value>, next: Option<&str>) -> Value {
    let cards = contents.into_iter().map(|c| json!({"content": c})).collect();
    json!({
        "organization": {
            "projectV2": {
                "title": title,
                "url": "https://github.com/orgs/o/projects/1",
                "items": connection_page(cards, next),
            }
        }
    })
}
