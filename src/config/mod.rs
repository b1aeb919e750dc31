//! Loading the YAML configuration file.
//!
//! The file is parsed into raw serde shapes first and then resolved into
//! typed digests, so every mistake (bad YAML, an unknown URL, a malformed
//! `since`) surfaces as a `ConfigError` before any request is made.
//!
//! Settings cascade: an item's own `ignore_users`/`include_bots` beat its
//! digest's, which beat `defaults`, which beat the built-in values.

mod raw;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::digest::{
    Cutoff, DigestOptions, DigestRequest, SinceError, Target, TargetError, TargetSource,
    parse_since,
};
use crate::github::{ApiError, DEFAULT_API_ROOT, DEFAULT_MAX_CONCURRENCY};
use raw::{RawDefaults, RawDigest, RawFile, RawItem};

/// `since` when nothing else says otherwise.
pub const DEFAULT_SINCE: &str = "1 week";

/// The environment variable holding the API token.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Error type for configuration problems, all detected before any fetch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration has no {0:?} key")]
    MissingKey(&'static str),

    #[error("in digest {digest}: {source}")]
    Target {
        digest: String,
        #[source]
        source: TargetError,
    },

    #[error("bad since {since:?}: {source}")]
    BadSince {
        since: String,
        #[source]
        source: SinceError,
    },

    #[error("{TOKEN_VAR} is not set")]
    MissingToken,

    #[error("can't set up the GitHub client: {0}")]
    Client(#[source] ApiError),
}

/// One digest to produce: where it goes and what goes in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSpec {
    pub output: PathBuf,
    pub request: DigestRequest,
}

/// A resolved configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_root: String,
    pub max_concurrency: usize,
    pub page_size: Option<u32>,
    pub digests: Vec<DigestSpec>,
}

impl Config {
    /// Reads and resolves `path`. `since_override` (from the command line)
    /// replaces every digest's `since`.
    pub fn load(
        path: &Path,
        now: DateTime<Utc>,
        since_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, now, since_override)
    }

    pub fn from_yaml(
        text: &str,
        now: DateTime<Utc>,
        since_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let file: RawFile = serde_yaml::from_str(text)?;
        let digests = file.digests.ok_or(ConfigError::MissingKey("digests"))?;
        let defaults = file.defaults;

        let digests = digests
            .into_iter()
            .map(|digest| resolve_digest(digest, &defaults, now, since_override))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            api_root: defaults
                .api_root
                .clone()
                .unwrap_or_else(|| DEFAULT_API_ROOT.to_string()),
            max_concurrency: defaults.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            page_size: defaults.page_size,
            digests,
        })
    }

    /// Restricts every digest to targets whose label contains one of
    /// `patterns`, dropping digests left with nothing to do.
    pub fn retain_matching(&mut self, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        for spec in &mut self.digests {
            spec.request.retain_matching(patterns);
        }
        self.digests.retain(|spec| !spec.request.targets.is_empty());
    }
}

/// Resolves a `since` setting against `now`.
pub fn resolve_since(since: &str, now: DateTime<Utc>) -> Result<Cutoff, ConfigError> {
    parse_since(since, now).map_err(|source| ConfigError::BadSince {
        since: since.to_string(),
        source,
    })
}

/// The API token, which must be present and non-empty.
pub fn require_token(token: Option<String>) -> Result<String, ConfigError> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(ConfigError::MissingToken),
    }
}

fn resolve_digest(
    raw: RawDigest,
    defaults: &RawDefaults,
    now: DateTime<Utc>,
    since_override: Option<&str>,
) -> Result<DigestSpec, ConfigError> {
    let since = since_override
        .map(str::to_string)
        .or(raw.since)
        .or_else(|| defaults.since.clone())
        .unwrap_or_else(|| DEFAULT_SINCE.to_string());
    let cutoff = resolve_since(&since, now)?;

    let name = raw.digest.display().to_string();
    let targets = raw
        .items
        .into_iter()
        .map(resolve_item)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::Target {
            digest: name,
            source,
        })?;

    let options = DigestOptions {
        ignore_users: raw
            .ignore_users
            .or_else(|| defaults.ignore_users.clone())
            .unwrap_or_default(),
        include_bots: raw.include_bots.or(defaults.include_bots).unwrap_or(false),
        fail_fast: raw.fail_fast.or(defaults.fail_fast).unwrap_or(false),
    };

    Ok(DigestSpec {
        output: raw.digest,
        request: DigestRequest {
            title: raw.title,
            since,
            cutoff,
            targets,
            options,
        },
    })
}

fn resolve_item(raw: RawItem) -> Result<Target, TargetError> {
    let (mut target, title, ignore_users, include_bots) = match raw {
        RawItem::Url(url) => return Target::from_url(&url),
        RawItem::Detailed(item) => {
            let mut target = Target::from_url(&item.url)?;
            if let Some(home_repo) = &item.home_repo {
                target = target.with_home_repo(home_repo)?;
            }
            (target, item.title, item.ignore_users, item.include_bots)
        }
        RawItem::Search(item) => (
            Target::search(item.search),
            item.title,
            item.ignore_users,
            item.include_bots,
        ),
        RawItem::PullRequests(item) => {
            let source = TargetSource::org_pull_requests(&item.pull_requests)?;
            (
                Target::new(source, item.pull_requests),
                item.title,
                item.ignore_users,
                item.include_bots,
            )
        }
    };
    target.title = title;
    target.ignore_users = ignore_users;
    target.include_bots = include_bots;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{ProjectOwner, RepoStreams};
    use crate::test_utils::{at, epoch};
    use crate::types::RepoId;

    const FULL: &str = r#"
defaults:
  since: 2 weeks
  ignore_users: [renovate]
  max_concurrency: 4
  page_size: 10
digests:
  - digest: out/weekly.json
    title: Weekly
    since: 1 week
    items:
      - https://github.com/o/r
      - https://github.com/o/r/pulls
      - url: https://github.com/orgs/o/projects/7
        home_repo: o/r
        title: Roadmap
        include_bots: true
      - search: "org:o label:security"
        title: Security
        ignore_users: []
      - pull_requests: org:o
  - digest: out/all.json
    include_bots: true
    items:
      - https://github.com/users/someone/projects/3
"#;

    fn full() -> Config {
        Config::from_yaml(FULL, epoch(), None).unwrap()
    }

    // ─── Resolution ───────────────────────────────────────────────────────────

    #[test]
    fn resolves_every_item_shape() {
        let config = full();
        assert_eq!(config.api_root, DEFAULT_API_ROOT);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.page_size, Some(10));

        let weekly = &config.digests[0];
        assert_eq!(weekly.output, PathBuf::from("out/weekly.json"));
        assert_eq!(weekly.request.title.as_deref(), Some("Weekly"));
        assert_eq!(weekly.request.cutoff, Cutoff::Since(at(8)));

        let sources: Vec<_> = weekly.request.targets.iter().map(|t| &t.source).collect();
        assert_eq!(
            sources[0],
            &TargetSource::Repo {
                repo: RepoId::new("o", "r"),
                streams: RepoStreams::ALL,
            }
        );
        assert!(matches!(
            sources[1],
            TargetSource::Repo { streams, .. } if !streams.issues && streams.pull_requests
        ));
        assert_eq!(
            sources[2],
            &TargetSource::Project {
                owner: ProjectOwner::Organization,
                login: "o".to_string(),
                number: 7,
            }
        );
        assert_eq!(
            sources[3],
            &TargetSource::Search {
                query: "org:o label:security".to_string()
            }
        );
        assert_eq!(
            sources[4],
            &TargetSource::Search {
                query: "org:o is:pr".to_string()
            }
        );

        let project = &weekly.request.targets[2];
        assert_eq!(project.title.as_deref(), Some("Roadmap"));
        assert_eq!(project.home_repo, Some(RepoId::new("o", "r")));
    }

    #[test]
    fn options_cascade_item_over_digest_over_defaults() {
        let config = full();
        let weekly = &config.digests[0].request;
        assert_eq!(weekly.options.ignore_users, ["renovate"]);
        assert!(!weekly.options.include_bots);

        let project = &weekly.targets[2];
        assert_eq!(project.include_bots, Some(true));
        assert_eq!(project.ignore_users, None);
        let search = &weekly.targets[3];
        assert_eq!(search.ignore_users, Some(Vec::new()));

        let all = &config.digests[1].request;
        assert!(all.options.include_bots);
        assert_eq!(all.since, "2 weeks");
        assert_eq!(all.cutoff, Cutoff::Since(at(1)));
    }

    #[test]
    fn since_override_replaces_every_digest() {
        let config = Config::from_yaml(FULL, epoch(), Some("forever")).unwrap();
        assert!(config
            .digests
            .iter()
            .all(|d| d.request.cutoff == Cutoff::Forever && d.request.since == "forever"));
    }

    #[test]
    fn built_in_defaults_apply() {
        let config = Config::from_yaml(
            "digests:\n  - digest: out.json\n    items: [https://github.com/o/r]\n",
            epoch(),
            None,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.page_size, None);
        let request = &config.digests[0].request;
        assert_eq!(request.since, DEFAULT_SINCE);
        assert_eq!(request.options, DigestOptions::default());
    }

    #[test]
    fn numeric_since_is_read_as_text() {
        let config = Config::from_yaml(
            "digests:\n  - digest: out.json\n    since: 20240310\n",
            epoch(),
            None,
        )
        .unwrap();
        assert_eq!(config.digests[0].request.since, "20240310");
        assert_eq!(
            config.digests[0].request.cutoff,
            Cutoff::Since(at(10) - chrono::Duration::hours(12))
        );
    }

    #[test]
    fn retain_matching_drops_emptied_digests() {
        let mut config = full();
        config.retain_matching(&["users/someone".to_string()]);
        assert_eq!(config.digests.len(), 1);
        assert_eq!(config.digests[0].output, PathBuf::from("out/all.json"));
    }

    // ─── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn missing_digests_key() {
        let err = Config::from_yaml("defaults:\n  since: 1 day\n", epoch(), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("digests")));
    }

    #[test]
    fn unrecognized_url_names_the_digest() {
        let err = Config::from_yaml(
            "digests:\n  - digest: out.json\n    items: [https://gitlab.com/o/r]\n",
            epoch(),
            None,
        )
        .unwrap_err();
        match err {
            ConfigError::Target { digest, .. } => assert_eq!(digest, "out.json"),
            other => panic!("expected target error, got {other:?}"),
        }
    }

    #[test]
    fn bad_since_is_reported() {
        let err = Config::from_yaml(
            "digests:\n  - digest: out.json\n    since: someday\n",
            epoch(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BadSince { since, .. } if since == "someday"));
    }

    #[test]
    fn malformed_yaml_and_unknown_keys() {
        assert!(matches!(
            Config::from_yaml("digests: [", epoch(), None),
            Err(ConfigError::Yaml(_))
        ));
        assert!(matches!(
            Config::from_yaml(
                "digests:\n  - digest: out.json\n    colour: blue\n",
                epoch(),
                None
            ),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = Config::load(&path, epoch(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { path: p, .. } if p == path));
    }

    #[test]
    fn token_must_be_present() {
        assert!(matches!(require_token(None), Err(ConfigError::MissingToken)));
        assert!(matches!(
            require_token(Some("  ".to_string())),
            Err(ConfigError::MissingToken)
        ));
        assert_eq!(require_token(Some("abc\n".to_string())).unwrap(), "abc");
    }
}
