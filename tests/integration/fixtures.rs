//! Shared synthetic tasks for the integration suite.

use async_trait::async_trait;
use nizima_fetch::core::task::{PipelineTask, TaskOutput};
use nizima_fetch::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

pub fn execution_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn position(log: &[String], id: &str) -> usize {
    log.iter()
        .position(|entry| entry == id)
        .unwrap_or_else(|| panic!("task {id} never ran"))
}

/// Task with no durable output that records its execution order.
pub struct RecordingTask {
    id: String,
    deps: Vec<String>,
    fail: bool,
    log: ExecutionLog,
}

impl RecordingTask {
    pub fn new(id: &str, deps: &[&str], log: &ExecutionLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            fail: false,
            log: Arc::clone(log),
        })
    }

    pub fn failing(id: &str, deps: &[&str], log: &ExecutionLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            fail: true,
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl PipelineTask for RecordingTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        false
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        // Yield once so sibling tasks in the same wave interleave.
        tokio::task::yield_now().await;
        if self.fail {
            return Err(Error::DataIntegrity(format!("{} blew up", self.id)));
        }
        self.log.lock().unwrap().push(self.id.clone());
        Ok(TaskOutput::None)
    }
}

/// Task with a durable output file, skippable by `is_done` on a re-run.
pub struct FileStepTask {
    id: String,
    deps: Vec<String>,
    output: PathBuf,
    contents: String,
    fail: bool,
    pub executions: Arc<AtomicUsize>,
}

impl FileStepTask {
    pub fn new(id: &str, deps: &[&str], work_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            output: work_dir.join(format!("{id}.out")),
            contents: format!("output of {id}"),
            fail: false,
            executions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn failing(id: &str, deps: &[&str], work_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            output: work_dir.join(format!("{id}.out")),
            contents: String::new(),
            fail: true,
            executions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }
}

#[async_trait]
impl PipelineTask for FileStepTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        tokio::fs::metadata(&self.output)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::DataIntegrity(format!("{} blew up", self.id)));
        }
        if let Some(parent) = self.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.output, &self.contents).await?;
        Ok(TaskOutput::File(self.output.clone()))
    }

    async fn recover(&self) -> Option<TaskOutput> {
        Some(TaskOutput::File(self.output.clone()))
    }
}
