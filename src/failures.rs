//! Durable failure log for retrieval failures.
//!
//! One JSON record per line, appended and never truncated, so terminal
//! download failures survive across invocations for later retry or audit.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const FAILURE_LOG_NAME: &str = "failures.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub item_id: String,
    /// Asset kind, e.g. "preview-archive" or "thumbnail".
    pub kind: String,
    pub url: String,
    pub destination: PathBuf,
    pub error: String,
}

impl FailureRecord {
    pub fn new(item_id: &str, kind: &str, url: &str, destination: &Path, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            item_id: item_id.to_string(),
            kind: kind.to_string(),
            url: url.to_string(),
            destination: destination.to_path_buf(),
            error: error.to_string(),
        }
    }
}

/// Appender for the standing failure log under the output root.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(FAILURE_LOG_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &FailureRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        info!(url = %record.url, kind = %record.kind, "failure recorded");
        Ok(())
    }

    /// All records currently in the log. Unparseable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<FailureRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
