//! Per-item orchestration and batch driving.
//!
//! One item's run: marker fast path → catalog lookup → stage preparation →
//! graph construction → scheduled execution → commit (or rollback) →
//! best-effort rename. A batch wraps the per-item runs in a second, coarser
//! admission gate; the two gates compose multiplicatively.

use crate::catalog::CatalogClient;
use crate::commit::{rename_published, Stage};
use crate::config::Config;
use crate::core::graph::TaskGraph;
use crate::core::scheduler::{DrainOutcome, Scheduler};
use crate::failures::FailureLog;
use crate::marker;
use crate::pipeline::TaskFactory;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How one item's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Published (and possibly renamed) at this directory.
    Fetched(PathBuf),
    /// The completion marker matched; nothing was fetched.
    UpToDate,
    /// The catalog has no preview archive for this item; nothing was
    /// created.
    SkippedNoPreview,
}

pub struct Fetcher {
    config: Config,
    client: CatalogClient,
    failure_log: Arc<FailureLog>,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let client = CatalogClient::new()?;
        let failure_log = Arc::new(FailureLog::new(&config.output_dir));
        Ok(Self {
            config,
            client,
            failure_log,
            cancel,
        })
    }

    /// Fetch one item end to end.
    pub async fn fetch_item(&self, item_id: &str) -> Result<FetchStatus> {
        if marker::is_item_current(item_id, &self.config.output_dir) {
            info!(item = item_id, "already at current version; skipping");
            return Ok(FetchStatus::UpToDate);
        }

        let (manifest, detail) = self
            .client
            .item_detail(item_id, self.config.attempt_export)
            .await?;
        if manifest.preview_archive.is_none() {
            warn!(item = item_id, "no preview archive; skipping");
            return Ok(FetchStatus::SkippedNoPreview);
        }

        let target_dir = self.config.output_dir.join(item_id);
        let stage = Stage::prepare(&target_dir)?;
        let work_dir = stage.context().work_dir;

        let factory = TaskFactory::new(
            item_id,
            work_dir,
            self.client.http().clone(),
            self.config.retry_policy(),
            Arc::clone(&self.failure_log),
        );
        let graph: Arc<RwLock<TaskGraph>> =
            Arc::new(RwLock::new(factory.build(&manifest, &detail)));

        let scheduler = Scheduler::new(
            Arc::clone(&graph),
            self.config.task_concurrency,
            self.cancel.child_token(),
        );
        let outcome = match scheduler.run().await {
            Ok(outcome) => outcome,
            Err(err) => {
                stage.rollback()?;
                return Err(err);
            }
        };

        match outcome {
            DrainOutcome::Completed => {
                let model_name = {
                    let graph = graph.read().await;
                    graph
                        .output_of(&format!("extract-preview-{item_id}"))
                        .and_then(|output| output.model_name().map(str::to_string))
                };

                let published = stage.commit()?;
                let final_dir = match model_name {
                    Some(name) => rename_published(&published, &format!("{item_id}_{name}")),
                    None => published,
                };
                info!(item = item_id, dir = %final_dir.display(), "item published");
                Ok(FetchStatus::Fetched(final_dir))
            }
            DrainOutcome::Failed { failed } => {
                // Fold each task's recorded error into the report.
                let failed = {
                    let graph = graph.read().await;
                    failed
                        .into_iter()
                        .map(|id| match graph.error_of(&id) {
                            Some(error) => format!("{id}: {error}"),
                            None => id,
                        })
                        .collect()
                };
                stage.rollback()?;
                Err(Error::Pipeline {
                    item_id: item_id.to_string(),
                    failed,
                })
            }
            DrainOutcome::Cancelled => {
                stage.rollback()?;
                Err(Error::Cancelled)
            }
            DrainOutcome::Stuck { blocked } => {
                stage.rollback()?;
                Err(Error::Stuck { blocked })
            }
        }
    }

    /// Fetch a batch of items behind the whole-item admission gate.
    ///
    /// Results come back in input order. Cancellation is checked before each
    /// item is admitted; items already running drain normally.
    pub async fn fetch_many(&self, item_ids: &[String]) -> Vec<(String, Result<FetchStatus>)> {
        let gate = Arc::new(Semaphore::new(self.config.item_concurrency.max(1)));
        info!(
            items = item_ids.len(),
            concurrency = self.config.item_concurrency,
            "starting batch"
        );

        let runs = item_ids.iter().map(|item_id| {
            let gate = Arc::clone(&gate);
            async move {
                let Ok(_permit) = gate.acquire().await else {
                    return (item_id.clone(), Err(Error::Cancelled));
                };
                if self.cancel.is_cancelled() {
                    return (item_id.clone(), Err(Error::Cancelled));
                }
                (item_id.clone(), self.fetch_item(item_id).await)
            }
        });

        futures::future::join_all(runs).await
    }
}
