//! Image placement task.
//!
//! Thumbnails and preview images need no transformation; the task moves the
//! downloaded bytes from the scratch area into their final place inside the
//! working directory.

use crate::core::task::{PipelineTask, TaskOutput};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub struct CopyImageTask {
    id: String,
    deps: Vec<String>,
    input_file: PathBuf,
    output_file: PathBuf,
}

impl CopyImageTask {
    pub fn new(id: &str, input_file: PathBuf, output_file: PathBuf, dep: &str) -> Self {
        Self {
            id: id.to_string(),
            deps: vec![dep.to_string()],
            input_file,
            output_file,
        }
    }
}

#[async_trait]
impl PipelineTask for CopyImageTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        tokio::fs::metadata(&self.output_file)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        if let Some(parent) = self.output_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&self.input_file, &self.output_file).await?;
        debug!(file = %self.output_file.display(), "image placed");
        Ok(TaskOutput::File(self.output_file.clone()))
    }
}
