//! The YAML shapes, as written.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub(super) struct RawFile {
    #[serde(default)]
    pub defaults: RawDefaults,
    pub digests: Option<Vec<RawDigest>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawDefaults {
    #[serde(default, deserialize_with = "scalar_text")]
    pub since: Option<String>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
    pub fail_fast: Option<bool>,
    pub api_root: Option<String>,
    pub max_concurrency: Option<usize>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawDigest {
    /// Output path of the payload.
    pub digest: PathBuf,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub since: Option<String>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
    pub fail_fast: Option<bool>,
    #[serde(default)]
    pub items: Vec<RawItem>,
}

/// One entry of a digest's `items` list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum RawItem {
    Url(String),
    Detailed(RawUrlItem),
    Search(RawSearchItem),
    PullRequests(RawPullRequestsItem),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawUrlItem {
    pub url: String,
    pub title: Option<String>,
    pub home_repo: Option<String>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawSearchItem {
    pub search: String,
    pub title: Option<String>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawPullRequestsItem {
    pub pull_requests: String,
    pub title: Option<String>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
}

/// Reads a scalar as text, so `since: 20240301` works without quotes.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    use serde::de::Error;
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(text)) => Ok(Some(text)),
        Some(serde_yaml::Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected text, found {other:?}"))),
    }
}
