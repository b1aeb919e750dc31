//! Configured sources of activity.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::RepoId;

static ORG_PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/orgs/(?P<login>[^/]+)/projects/(?P<number>\d+)(?:/.*)?$")
        .expect("org project pattern is valid")
});

static USER_PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/users/(?P<login>[^/]+)/projects/(?P<number>\d+)(?:/.*)?$")
        .expect("user project pattern is valid")
});

static REPO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://github\.com/(?P<owner>[^/]+)/(?P<name>[^/]+)(?:/(?P<stream>issues|pulls|releases))?/?$",
    )
    .expect("repo pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("can't understand URL {0:?}")]
    UnrecognizedUrl(String),

    #[error("don't understand pull_requests scope {0:?}, expected \"org:<name>\"")]
    BadScope(String),

    #[error("home_repo {0:?} is not of the form owner/name")]
    BadHomeRepo(String),
}

/// Who owns a project board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOwner {
    Organization,
    User,
}

/// Which listings of a repository to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoStreams {
    pub issues: bool,
    pub pull_requests: bool,
    pub releases: bool,
}

impl RepoStreams {
    pub const ALL: Self = Self {
        issues: true,
        pull_requests: true,
        releases: true,
    };

    pub const NONE: Self = Self {
        issues: false,
        pull_requests: false,
        releases: false,
    };
}

/// Where a target's items come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    Project {
        owner: ProjectOwner,
        login: String,
        number: u64,
    },
    Repo {
        repo: RepoId,
        streams: RepoStreams,
    },
    Search {
        query: String,
    },
}

impl TargetSource {
    /// Recognizes a GitHub project or repository URL.
    pub fn from_url(url: &str) -> Result<Self, TargetError> {
        let url = url.trim();
        for (pattern, owner) in [
            (&*ORG_PROJECT, ProjectOwner::Organization),
            (&*USER_PROJECT, ProjectOwner::User),
        ] {
            if let Some(caps) = pattern.captures(url) {
                let number = caps["number"]
                    .parse()
                    .map_err(|_| TargetError::UnrecognizedUrl(url.to_string()))?;
                return Ok(TargetSource::Project {
                    owner,
                    login: caps["login"].to_string(),
                    number,
                });
            }
        }

        let caps = REPO
            .captures(url)
            .ok_or_else(|| TargetError::UnrecognizedUrl(url.to_string()))?;
        let streams = match caps.name("stream").map(|m| m.as_str()) {
            None => RepoStreams::ALL,
            Some("issues") => RepoStreams {
                issues: true,
                ..RepoStreams::NONE
            },
            Some("pulls") => RepoStreams {
                pull_requests: true,
                ..RepoStreams::NONE
            },
            Some(_) => RepoStreams {
                releases: true,
                ..RepoStreams::NONE
            },
        };
        Ok(TargetSource::Repo {
            repo: RepoId::new(&caps["owner"], &caps["name"]),
            streams,
        })
    }

    /// The `pull_requests: org:<name>` shorthand.
    pub fn org_pull_requests(scope: &str) -> Result<Self, TargetError> {
        let org = scope
            .trim()
            .strip_prefix("org:")
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .ok_or_else(|| TargetError::BadScope(scope.to_string()))?;
        Ok(TargetSource::Search {
            query: format!("org:{org} is:pr"),
        })
    }
}

/// One configured source plus its per-target settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub source: TargetSource,
    /// The URL or query as written, for logs, errors and `--only`.
    pub label: String,
    pub title: Option<String>,
    /// For projects: the repository most items live in.
    pub home_repo: Option<RepoId>,
    pub ignore_users: Option<Vec<String>>,
    pub include_bots: Option<bool>,
}

impl Target {
    pub fn new(source: TargetSource, label: impl Into<String>) -> Self {
        Self {
            source,
            label: label.into(),
            title: None,
            home_repo: None,
            ignore_users: None,
            include_bots: None,
        }
    }

    pub fn from_url(url: &str) -> Result<Self, TargetError> {
        Ok(Self::new(TargetSource::from_url(url)?, url.trim()))
    }

    pub fn search(query: impl Into<String>) -> Self {
        let query = query.into();
        Self::new(TargetSource::Search { query: query.clone() }, query)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_home_repo(mut self, home_repo: &str) -> Result<Self, TargetError> {
        let repo =
            RepoId::parse(home_repo).ok_or_else(|| TargetError::BadHomeRepo(home_repo.to_string()))?;
        self.home_repo = Some(repo);
        Ok(self)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_project_urls() {
        for url in [
            "https://github.com/orgs/openedx/projects/19",
            "https://github.com/orgs/openedx/projects/19/views/3",
        ] {
            assert_eq!(
                TargetSource::from_url(url).unwrap(),
                TargetSource::Project {
                    owner: ProjectOwner::Organization,
                    login: "openedx".to_string(),
                    number: 19
                }
            );
        }
    }

    #[test]
    fn user_project_url() {
        assert_eq!(
            TargetSource::from_url("https://github.com/users/nedbat/projects/3").unwrap(),
            TargetSource::Project {
                owner: ProjectOwner::User,
                login: "nedbat".to_string(),
                number: 3
            }
        );
    }

    #[test]
    fn repo_urls_select_streams() {
        let repo = RepoId::new("nedbat", "coveragepy");
        assert_eq!(
            TargetSource::from_url("https://github.com/nedbat/coveragepy").unwrap(),
            TargetSource::Repo {
                repo: repo.clone(),
                streams: RepoStreams::ALL
            }
        );
        assert_eq!(
            TargetSource::from_url("https://github.com/nedbat/coveragepy/pulls/").unwrap(),
            TargetSource::Repo {
                repo: repo.clone(),
                streams: RepoStreams {
                    pull_requests: true,
                    ..RepoStreams::NONE
                }
            }
        );
        assert_eq!(
            TargetSource::from_url("https://github.com/nedbat/coveragepy/releases").unwrap(),
            TargetSource::Repo {
                repo,
                streams: RepoStreams {
                    releases: true,
                    ..RepoStreams::NONE
                }
            }
        );
    }

    #[test]
    fn unrecognized_urls() {
        for url in [
            "https://gitlab.com/a/b",
            "https://github.com/nedbat",
            "https://github.com/nedbat/coveragepy/wiki",
            "https://github.com/orgs/openedx/projects/latest",
            "not a url",
        ] {
            assert!(
                matches!(TargetSource::from_url(url), Err(TargetError::UnrecognizedUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn pull_requests_shorthand() {
        assert_eq!(
            TargetSource::org_pull_requests("org:openedx").unwrap(),
            TargetSource::Search {
                query: "org:openedx is:pr".to_string()
            }
        );
        assert!(matches!(
            TargetSource::org_pull_requests("user:nedbat"),
            Err(TargetError::BadScope(_))
        ));
        assert!(TargetSource::org_pull_requests("org:").is_err());
    }

    #[test]
    fn home_repo_must_be_owner_slash_name() {
        let target = Target::from_url("https://github.com/orgs/o/projects/1").unwrap();
        assert!(target.clone().with_home_repo("o/r").is_ok());
        assert!(matches!(
            target.with_home_repo("just-a-name"),
            Err(TargetError::BadHomeRepo(_))
        ));
    }
}
