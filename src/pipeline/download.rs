//! Download task: the dependency-free leaf of every asset chain.
//!
//! Produces a local file from a source locator with a bounded retry budget.
//! A spent budget is terminal for the task and leaves a durable record in
//! the failure log.

use crate::core::task::{PipelineTask, TaskOutput};
use crate::failures::{FailureLog, FailureRecord};
use crate::retry::{retrying, RetryPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// How the remote side serves the asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFlow {
    /// Plain GET of a stored object.
    Stored,
    /// Export flow: POST the file name, then follow the returned
    /// `downloadUrl`. Requires an authenticated session on the catalog side.
    Export { file_name: String },
}

pub struct DownloadTask {
    id: String,
    deps: Vec<String>,
    item_id: String,
    /// Asset kind recorded in failure-log entries.
    kind: String,
    url: String,
    target_path: PathBuf,
    flow: DownloadFlow,
    http: reqwest::Client,
    policy: RetryPolicy,
    failure_log: Arc<FailureLog>,
}

impl DownloadTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        item_id: &str,
        kind: &str,
        url: &str,
        target_path: PathBuf,
        flow: DownloadFlow,
        http: reqwest::Client,
        policy: RetryPolicy,
        failure_log: Arc<FailureLog>,
    ) -> Self {
        Self {
            id: id.to_string(),
            deps: Vec::new(),
            item_id: item_id.to_string(),
            kind: kind.to_string(),
            url: url.to_string(),
            target_path,
            flow,
            http,
            policy,
            failure_log,
        }
    }

    async fn fetch_bytes(&self) -> Result<Vec<u8>> {
        match &self.flow {
            DownloadFlow::Stored => {
                let response = self.http.get(&self.url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            DownloadFlow::Export { file_name } => {
                let form = [("fileName", file_name.as_str())];
                let response = self.http.post(&self.url).form(&form).send().await?;

                // An HTML answer is the catalog's login page: terminal, not
                // a transport hiccup.
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if content_type.contains("text/html") {
                    return Err(Error::Download {
                        url: self.url.clone(),
                        reason: "export download requires an authenticated account".to_string(),
                    });
                }

                let body: Value = response.error_for_status()?.json().await?;
                let succeeded = body
                    .get("isSucceeded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let download_url = body.get("downloadUrl").and_then(Value::as_str);
                let (true, Some(download_url)) = (succeeded, download_url) else {
                    return Err(Error::Download {
                        url: self.url.clone(),
                        reason: format!("download API refused the request: {body}"),
                    });
                };

                let file = self
                    .http
                    .get(download_url)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(file.bytes().await?.to_vec())
            }
        }
    }
}

#[async_trait]
impl PipelineTask for DownloadTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        tokio::fs::metadata(&self.target_path)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        if let Some(parent) = self.target_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(url = %self.url, "downloading");
        let bytes = match retrying(&self.policy, &self.id, || self.fetch_bytes()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let record = FailureRecord::new(
                    &self.item_id,
                    &self.kind,
                    &self.url,
                    &self.target_path,
                    &err.to_string(),
                );
                if let Err(log_err) = self.failure_log.append(&record) {
                    warn!(error = %log_err, "could not append to failure log");
                }
                return Err(err);
            }
        };

        // Stage into a sibling and rename so an interrupted write can never
        // look like a finished download.
        let partial = self.target_path.with_extension("part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &self.target_path).await?;

        info!(
            file = %self.target_path.display(),
            bytes = bytes.len(),
            "download complete"
        );
        Ok(TaskOutput::File(self.target_path.clone()))
    }
}
