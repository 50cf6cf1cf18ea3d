//! Persist tasks: the raw detail blob and the completion marker.

use crate::core::task::{PipelineTask, TaskOutput};
use crate::marker::{VersionMarker, MARKER_FILE};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Writes the catalog's detail blob verbatim into the working directory.
pub struct SaveDetailTask {
    id: String,
    deps: Vec<String>,
    output_path: PathBuf,
    detail: Value,
}

impl SaveDetailTask {
    pub fn new(id: &str, output_path: PathBuf, detail: Value) -> Self {
        Self {
            id: id.to_string(),
            deps: Vec::new(),
            output_path,
            detail,
        }
    }
}

#[async_trait]
impl PipelineTask for SaveDetailTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        tokio::fs::metadata(&self.output_path)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        if let Some(parent) = self.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pretty = serde_json::to_string_pretty(&self.detail)?;
        tokio::fs::write(&self.output_path, pretty).await?;
        debug!(file = %self.output_path.display(), "detail blob saved");
        Ok(TaskOutput::File(self.output_path.clone()))
    }
}

/// Writes the completion marker as the graph's sink.
///
/// Runs after the extract chains, so it can fold the discovered model name
/// into the marker; the marker reaches the published target only through a
/// successful commit.
pub struct SaveVersionTask {
    id: String,
    deps: Vec<String>,
    work_dir: PathBuf,
    item_id: String,
}

impl SaveVersionTask {
    pub fn new(id: &str, work_dir: PathBuf, item_id: &str, deps: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            deps,
            work_dir,
            item_id: item_id.to_string(),
        }
    }
}

#[async_trait]
impl PipelineTask for SaveVersionTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        VersionMarker::read(&self.work_dir).is_some_and(|marker| marker.is_current())
    }

    async fn execute(&self, model_name: Option<&str>) -> Result<TaskOutput> {
        let marker = VersionMarker::current(&self.item_id, model_name.map(str::to_string));
        marker.write(&self.work_dir)?;
        debug!(item = %self.item_id, "version marker saved");
        Ok(TaskOutput::File(self.work_dir.join(MARKER_FILE)))
    }

    fn consumes_model_name(&self) -> bool {
        true
    }
}
