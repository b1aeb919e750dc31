//! The `gh-digest` command line.
//!
//! `run` produces every digest in a configuration file, `url` produces a
//! one-target digest without one, and `adhoc` runs a single GraphQL document
//! through the same fetcher for exploring the API.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{self, Config, ConfigError, DEFAULT_SINCE, DigestSpec, TOKEN_VAR};
use crate::digest::{DigestBuilder, DigestOptions, DigestRequest, DigestSet, RunError, Target};
use crate::github::{
    CacheMode, Clock, DEFAULT_API_ROOT, GraphqlTransport, OctocrabTransport, PageCache,
    PagedFetcher, Query, RateLimitGate, SystemClock,
};
use crate::output::write_payload;

pub const EXIT_TARGET_FAILED: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Summarise recent GitHub activity into digests.
#[derive(Debug, Parser)]
#[command(name = "gh-digest", version, about)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// GitHub API token
    #[arg(long, env = TOKEN_VAR, hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Save every raw API page into this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub save_responses: Option<PathBuf>,

    /// Answer API pages from this directory when a saved copy exists
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "save_responses")]
    pub replay: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Produce every digest in a configuration file
    Run {
        #[arg(default_value = "gh-digest.yaml")]
        config: PathBuf,

        /// Override every digest's `since`
        #[arg(long)]
        since: Option<String>,

        /// Only run targets whose URL or query contains this text
        #[arg(long, value_name = "TEXT")]
        only: Vec<String>,
    },

    /// Produce a digest of a single repository, project or search URL
    Url {
        url: String,

        #[arg(long, default_value = DEFAULT_SINCE)]
        since: String,

        #[arg(short, long, default_value = "digest.json")]
        output: PathBuf,
    },

    /// Run one GraphQL query and print the JSON result
    Adhoc {
        query_file: PathBuf,

        /// Variables, as NAME=VALUE, NAME:int=VALUE or NAME:str=VALUE
        #[arg(value_name = "VAR[:TYPE]=VAL")]
        vars: Vec<String>,

        /// Follow pagination and print all nodes instead of the raw result
        #[arg(long)]
        nodes: bool,
    },
}

impl Cli {
    /// The default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "gh_digest=debug,info"
        } else {
            "gh_digest=info,warn"
        }
    }

    fn cache(&self) -> Option<PageCache> {
        match (&self.save_responses, &self.replay) {
            (Some(dir), _) => Some(PageCache::new(dir, CacheMode::Record)),
            (None, Some(dir)) => Some(PageCache::new(dir, CacheMode::Replay)),
            (None, None) => None,
        }
    }
}

/// Runs the parsed command line to an exit status.
pub async fn execute(cli: Cli, cancel: CancellationToken) -> ExitCode {
    ExitCode::from(dispatch(&cli, &cancel).await)
}

async fn dispatch(cli: &Cli, cancel: &CancellationToken) -> u8 {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    match &cli.command {
        Command::Run {
            config,
            since,
            only,
        } => {
            let loaded = Config::load(config, clock.now(), since.as_deref()).map(|mut c| {
                c.retain_matching(only);
                c
            });
            match loaded {
                Ok(config) => run_digests(cli, config, clock, cancel).await,
                Err(e) => config_failure(&e),
            }
        }
        Command::Url { url, since, output } => {
            match url_config(url, since, output, clock.now()) {
                Ok(config) => run_digests(cli, config, clock, cancel).await,
                Err(e) => config_failure(&e),
            }
        }
        Command::Adhoc {
            query_file,
            vars,
            nodes,
        } => {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return EXIT_INTERRUPTED,
                result = adhoc(cli, clock, query_file, vars, *nodes) => result,
            };
            match result {
                Ok(()) => 0,
                Err(e) => {
                    error!("{e:#}");
                    EXIT_TARGET_FAILED
                }
            }
        }
    }
}

fn config_failure(e: &ConfigError) -> u8 {
    error!(error = %e, "Configuration error");
    EXIT_CONFIG
}

fn url_config(
    url: &str,
    since: &str,
    output: &Path,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Config, ConfigError> {
    let target = Target::from_url(url).map_err(|source| ConfigError::Target {
        digest: output.display().to_string(),
        source,
    })?;
    let cutoff = config::resolve_since(since, now)?;
    Ok(Config {
        api_root: DEFAULT_API_ROOT.to_string(),
        max_concurrency: crate::github::DEFAULT_MAX_CONCURRENCY,
        page_size: None,
        digests: vec![DigestSpec {
            output: output.to_path_buf(),
            request: DigestRequest {
                title: None,
                since: since.to_string(),
                cutoff,
                targets: vec![target],
                options: DigestOptions::default(),
            },
        }],
    })
}

fn fetcher(
    cli: &Cli,
    api_root: &str,
    clock: Arc<dyn Clock>,
) -> Result<PagedFetcher<OctocrabTransport>, ConfigError> {
    let token = config::require_token(cli.token.clone())?;
    let transport = OctocrabTransport::from_token(token, api_root).map_err(ConfigError::Client)?;
    let mut fetcher = PagedFetcher::new(transport, Arc::new(RateLimitGate::new(clock)));
    if let Some(cache) = cli.cache() {
        fetcher = fetcher.with_cache(cache);
    }
    Ok(fetcher)
}

async fn run_digests(
    cli: &Cli,
    config: Config,
    clock: Arc<dyn Clock>,
    cancel: &CancellationToken,
) -> u8 {
    let fetcher = match fetcher(cli, &config.api_root, clock.clone()) {
        Ok(f) => f.with_max_concurrency(config.max_concurrency),
        Err(e) => return config_failure(&e),
    };
    let builder = match DigestBuilder::new(Arc::new(fetcher), config.page_size) {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "Can't build queries");
            return EXIT_CONFIG;
        }
    };
    let set = DigestSet::new(builder, clock);
    let status = write_digests(&set, &config.digests, cancel).await;

    if let Some(rate_limit) = set.builder().fetcher().gate().last_rate_limit() {
        info!("{rate_limit}");
    }
    status
}

/// Runs each digest in turn and writes its payload.
///
/// A payload with failed targets is still written, but the status is
/// `EXIT_TARGET_FAILED`. An interrupt stops at once and writes nothing more.
async fn write_digests<T: GraphqlTransport>(
    set: &DigestSet<T>,
    digests: &[DigestSpec],
    cancel: &CancellationToken,
) -> u8 {
    let mut failed = false;
    for spec in digests {
        match set.run(&spec.request, cancel).await {
            Ok(payload) => {
                failed |= !payload.is_complete();
                match write_payload(&spec.output, &payload) {
                    Ok(()) => info!(path = %spec.output.display(), "Wrote digest"),
                    Err(e) => {
                        error!(error = %e, "Can't write digest");
                        failed = true;
                    }
                }
            }
            Err(RunError::Cancelled) => return EXIT_INTERRUPTED,
            Err(e) => {
                error!(error = %e, path = %spec.output.display(), "Digest failed");
                failed = true;
            }
        }
    }
    if failed { EXIT_TARGET_FAILED } else { 0 }
}

async fn adhoc(
    cli: &Cli,
    clock: Arc<dyn Clock>,
    query_file: &Path,
    vars: &[String],
    nodes: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(query_file)
        .with_context(|| format!("can't read {}", query_file.display()))?;
    let variables = parse_variables(vars)?;
    let fetcher = fetcher(cli, DEFAULT_API_ROOT, clock)?;
    let query = Query::adhoc(text);

    let result = if nodes {
        Value::Array(fetcher.pages(&query, variables).collect().await?.nodes)
    } else {
        fetcher.execute(&query, &variables).await?
    };
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(rate_limit) = fetcher.gate().last_rate_limit() {
        info!("{rate_limit}");
    }
    Ok(())
}

/// Parses `NAME[:TYPE]=VALUE` arguments; `TYPE` is `int` or `str`.
pub fn parse_variables(vars: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut variables = Map::new();
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("variable {var:?} should look like NAME=VALUE");
        };
        let (name, value) = match name.split_once(':') {
            None => (name, Value::from(value)),
            Some((name, "str")) => (name, Value::from(value)),
            Some((name, "int")) => {
                let number: i64 = value
                    .parse()
                    .with_context(|| format!("{name} should be an integer, not {value:?}"))?;
                (name, Value::from(number))
            }
            Some((_, other)) => bail!("unknown variable type {other:?}, expected int or str"),
        };
        variables.insert(name.to_string(), value);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PausedClock, ScriptedTransport, at, epoch, issue, repo_page, user};
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn variables_with_types() {
        let vars = parse_variables(&args(&["owner=o", "number:int=42", "name:str=007"])).unwrap();
        assert_eq!(Value::Object(vars), json!({"owner": "o", "number": 42, "name": "007"}));
    }

    #[test]
    fn value_may_contain_equals() {
        let vars = parse_variables(&args(&["query=label:a=b"])).unwrap();
        assert_eq!(vars["query"], json!("label:a=b"));
    }

    #[test]
    fn bad_variables_are_rejected() {
        assert!(parse_variables(&args(&["owner"])).is_err());
        assert!(parse_variables(&args(&["n:int=four"])).is_err());
        assert!(parse_variables(&args(&["n:float=4.0"])).is_err());
    }

    #[test]
    fn run_defaults_and_repeated_only() {
        let cli = Cli::try_parse_from(["gh-digest", "run", "--only", "o/r", "--only", "projects"])
            .unwrap();
        assert_eq!(cli.log_directive(), "gh_digest=info,warn");
        match &cli.command {
            Command::Run {
                config,
                since,
                only,
            } => {
                assert_eq!(config, &PathBuf::from("gh-digest.yaml"));
                assert_eq!(since, &None);
                assert_eq!(only, &["o/r", "projects"]);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn save_and_replay_conflict() {
        let result = Cli::try_parse_from([
            "gh-digest",
            "--save-responses",
            "a",
            "--replay",
            "b",
            "run",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn url_config_builds_one_digest() {
        let now = epoch();
        let config = url_config(
            "https://github.com/o/r/releases",
            "3 days",
            Path::new("out.json"),
            now,
        )
        .unwrap();
        assert_eq!(config.digests.len(), 1);
        let request = &config.digests[0].request;
        assert_eq!(request.targets[0].label, "https://github.com/o/r/releases");
        assert_eq!(request.cutoff.instant(), Some(at(12)));

        assert!(matches!(
            url_config("https://example.com/x", "1 day", Path::new("out.json"), now),
            Err(ConfigError::Target { .. })
        ));
    }

    // ─── Exit status ──────────────────────────────────────────────────────────

    /// Repo issues answer with one fresh issue; any other query is unscripted
    /// and fails.
    fn scripted_set() -> DigestSet<ScriptedTransport> {
        let clock = Arc::new(PausedClock::starting_at(epoch()));
        let transport = ScriptedTransport::new(clock.clone());
        transport.respond_ok(
            "getRepoIssues",
            None,
            repo_page("issues", vec![issue("I_1", 1, at(12), user("alice"))], None),
        );
        let fetcher = PagedFetcher::new(transport, Arc::new(RateLimitGate::new(clock.clone())));
        DigestSet::new(DigestBuilder::new(Arc::new(fetcher), None).unwrap(), clock)
    }

    fn digest_at(output: PathBuf, targets: Vec<Target>) -> DigestSpec {
        DigestSpec {
            output,
            request: DigestRequest {
                title: Some("Weekly".to_string()),
                since: "1 week".to_string(),
                cutoff: crate::digest::parse_since("1 week", epoch()).unwrap(),
                targets,
                options: DigestOptions::default(),
            },
        }
    }

    #[tokio::test]
    async fn failed_target_still_writes_payload_and_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekly.json");
        let digests = [digest_at(
            path.clone(),
            vec![
                Target::from_url("https://github.com/o/r/issues").unwrap(),
                Target::search("org:o"),
            ],
        )];

        let status = write_digests(&scripted_set(), &digests, &CancellationToken::new()).await;

        assert_eq!(status, EXIT_TARGET_FAILED);
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["containers"].as_array().unwrap().len(), 1);
        assert_eq!(written["failures"].as_array().unwrap().len(), 1);
        assert_eq!(written["failures"][0]["target"], json!("org:o"));
    }

    #[tokio::test]
    async fn complete_digests_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.json");
        let digests = [digest_at(
            path.clone(),
            vec![Target::from_url("https://github.com/o/r/issues").unwrap()],
        )];

        let status = write_digests(&scripted_set(), &digests, &CancellationToken::new()).await;

        assert_eq!(status, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn interrupt_exits_130_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        let target = || vec![Target::from_url("https://github.com/o/r/issues").unwrap()];
        let digests = [digest_at(first.clone(), target()), digest_at(second.clone(), target())];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let status = write_digests(&scripted_set(), &digests, &cancel).await;

        assert_eq!(status, EXIT_INTERRUPTED);
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[tokio::test]
    async fn configuration_problems_exit_two_before_fetching() {
        let mut cli = Cli::try_parse_from(["gh-digest", "url", "https://github.com/o/r"]).unwrap();
        cli.token = None;
        assert_eq!(dispatch(&cli, &CancellationToken::new()).await, EXIT_CONFIG);

        let cli = Cli::try_parse_from([
            "gh-digest",
            "--token",
            "t",
            "url",
            "https://example.com/o/r",
        ])
        .unwrap();
        assert_eq!(dispatch(&cli, &CancellationToken::new()).await, EXIT_CONFIG);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let missing = missing.to_str().unwrap();
        let cli = Cli::try_parse_from(["gh-digest", "--token", "t", "run", missing]).unwrap();
        assert_eq!(dispatch(&cli, &CancellationToken::new()).await, EXIT_CONFIG);
    }
}
