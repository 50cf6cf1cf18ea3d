//! Extract task: unpack the container into a directory tree.
//!
//! Archives may carry the marketplace's fixed passphrase, so extraction is
//! attempted passphrase-first with an unprotected fallback. The model name
//! is discovered as the stem of the first `.moc3` file under the output
//! tree and travels downstream as the task's result payload.

use crate::core::task::{PipelineTask, TaskOutput};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Fixed passphrase protecting most marketplace archives.
const ARCHIVE_PASSPHRASE: &[u8] = b"LrND6UfK(j-NmN7tTb+2S&6J56rEdfHJ3+pA";

pub struct ExtractTask {
    id: String,
    deps: Vec<String>,
    input_file: PathBuf,
    output_dir: PathBuf,
}

impl ExtractTask {
    pub fn new(id: &str, input_file: PathBuf, output_dir: PathBuf, dep: &str) -> Self {
        Self {
            id: id.to_string(),
            deps: vec![dep.to_string()],
            input_file,
            output_dir,
        }
    }

    fn recovered_output(&self) -> TaskOutput {
        TaskOutput::Extracted {
            dir: self.output_dir.clone(),
            model_name: find_model_name(&self.output_dir),
        }
    }
}

#[async_trait]
impl PipelineTask for ExtractTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn is_done(&self) -> bool {
        // A model file anywhere under this task's own output root is the
        // completion signal; preview and export roots are disjoint.
        let output_dir = self.output_dir.clone();
        tokio::task::spawn_blocking(move || find_moc3(&output_dir).is_some())
            .await
            .unwrap_or(false)
    }

    async fn execute(&self, _model_name: Option<&str>) -> Result<TaskOutput> {
        let input = self.input_file.clone();
        let output_dir = self.output_dir.clone();
        tokio::task::spawn_blocking(move || extract_archive(&input, &output_dir))
            .await
            .map_err(|err| Error::TaskJoin(err.to_string()))??;

        let output = self.recovered_output();
        match output.model_name() {
            Some(name) => info!(task = %self.id, model = name, "extraction complete"),
            None => info!(task = %self.id, "extraction complete; no model file found"),
        }
        Ok(output)
    }

    async fn recover(&self) -> Option<TaskOutput> {
        Some(self.recovered_output())
    }
}

fn extract_archive(input: &Path, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    let file = fs::File::open(input)?;
    let mut archive = ZipArchive::new(file)?;
    debug!(entries = archive.len(), file = %input.display(), "opening archive");

    // Passphrase-protected extraction first, plain extraction as fallback.
    if let Err(err) = extract_entries(&mut archive, output_dir, Some(ARCHIVE_PASSPHRASE)) {
        debug!(error = %err, "passphrase extraction failed; trying unprotected");
        extract_entries(&mut archive, output_dir, None)?;
    }
    Ok(())
}

fn extract_entries(
    archive: &mut ZipArchive<fs::File>,
    output_dir: &Path,
    passphrase: Option<&[u8]>,
) -> Result<()> {
    for index in 0..archive.len() {
        let mut entry = match passphrase {
            Some(passphrase) => archive.by_index_decrypt(index, passphrase)?,
            None => archive.by_index(index)?,
        };

        // Entries with absolute or parent-traversing names are not written.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let destination = output_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&destination)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(())
}

/// Stem of the first `.moc3` file under `dir`, if any.
pub fn find_model_name(dir: &Path) -> Option<String> {
    find_moc3(dir)
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
}

fn find_moc3(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_moc3(&path) {
                return Some(found);
            }
        } else if path.extension().is_some_and(|ext| ext == "moc3") {
            return Some(path);
        }
    }
    None
}
