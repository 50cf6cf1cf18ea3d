//! Persisted completion marker.
//!
//! A `version.json` carrying the current format tag is the sole signal that
//! an item needs no further work on a later invocation. It is written into
//! the working directory as the pipeline's final task, so it only ever
//! reaches the published target as part of a fully successful commit.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Format tag recorded on success. Bumping it invalidates every previously
/// published item on the next run.
pub const FORMAT_VERSION: &str = "v4";

pub const MARKER_FILE: &str = "version.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionMarker {
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl VersionMarker {
    pub fn current(item_id: &str, model_name: Option<String>) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            updated_at: Utc::now(),
            item_id: item_id.to_string(),
            model_name,
        }
    }

    pub fn is_current(&self) -> bool {
        self.version == FORMAT_VERSION
    }

    /// Write the marker as `version.json` inside `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(MARKER_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read the marker from `dir`, tolerating absence and malformed content.
    pub fn read(dir: &Path) -> Option<Self> {
        let contents = fs::read_to_string(dir.join(MARKER_FILE)).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

/// Whether `item_id` is already published at the current format version.
///
/// The marker is looked up under the canonical `<out>/<id>` directory first,
/// then under any renamed `<out>/<id>_*` variant.
pub fn is_item_current(item_id: &str, output_dir: &Path) -> bool {
    if let Some(marker) = VersionMarker::read(&output_dir.join(item_id)) {
        debug!(item = item_id, version = %marker.version, "found canonical marker");
        return marker.is_current();
    }

    let prefix = format!("{item_id}_");
    let Ok(entries) = fs::read_dir(output_dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        if let Some(marker) = VersionMarker::read(&path) {
            debug!(item = item_id, dir = name, version = %marker.version, "found renamed marker");
            return marker.is_current();
        }
    }

    false
}
