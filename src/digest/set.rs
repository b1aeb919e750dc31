//! Running every target of a digest.
//!
//! Targets are built concurrently (the fetcher bounds how many requests are
//! in flight) and each is an independent unit: a failed target becomes a
//! `FailedTarget` entry and the others carry on, unless `fail_fast` is set.
//! Containers come out in configuration order whatever order the builds
//! finish in.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::builder::{BuildError, DigestBuilder};
use super::container::{DigestPayload, FailedTarget};
use super::options::DigestRequest;
use crate::github::{Clock, GraphqlTransport};

/// Error type for a digest run that produced no payload.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("interrupted")]
    Cancelled,

    #[error("{target}: {source}")]
    Target {
        target: String,
        #[source]
        source: BuildError,
    },
}

/// Drives a `DigestBuilder` over all the targets of a request.
pub struct DigestSet<T> {
    builder: DigestBuilder<T>,
    clock: Arc<dyn Clock>,
}

impl<T: GraphqlTransport> DigestSet<T> {
    pub fn new(builder: DigestBuilder<T>, clock: Arc<dyn Clock>) -> Self {
        Self { builder, clock }
    }

    pub fn builder(&self) -> &DigestBuilder<T> {
        &self.builder
    }

    /// Builds every target. Stops early, without a payload, when `cancel`
    /// fires or when a target fails under `fail_fast`.
    #[instrument(skip_all, fields(digest = request.title.as_deref().unwrap_or("")))]
    pub async fn run(
        &self,
        request: &DigestRequest,
        cancel: &CancellationToken,
    ) -> Result<DigestPayload, RunError> {
        info!(
            targets = request.targets.len(),
            since = %request.cutoff.describe(),
            "Building digest"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Digest interrupted");
                Err(RunError::Cancelled)
            }
            result = self.build_all(request) => result,
        }
    }

    async fn build_all(&self, request: &DigestRequest) -> Result<DigestPayload, RunError> {
        let builds = request.targets.iter().map(|target| async move {
            let filter = request.options.filter_for(target);
            self.builder
                .build(target, &request.cutoff, &filter)
                .await
                .map_err(|source| RunError::Target {
                    target: target.label.clone(),
                    source,
                })
        });

        let mut containers = Vec::new();
        let mut failures = Vec::new();
        if request.options.fail_fast {
            containers = try_join_all(builds).await?;
        } else {
            for outcome in join_all(builds).await {
                match outcome {
                    Ok(container) => containers.push(container),
                    Err(RunError::Target { target, source }) => {
                        error!(target = %target, error = %source, "Target failed");
                        failures.push(FailedTarget {
                            target,
                            error: source.to_string(),
                        });
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Ok(DigestPayload {
            title: request.title.clone(),
            generated_at: self.clock.now(),
            since: request.since.clone(),
            since_description: request.cutoff.describe(),
            cutoff: request.cutoff,
            containers,
            failures,
        })
    }
}
