//! Atomic publication of one item's pipeline output.
//!
//! All side effects of a run accumulate in a working directory under the
//! store's `.staging/` area. The visible target directory only ever reflects
//! the previous valid state or a fully successful run, never a mixture:
//! an existing target is moved aside before the run and either discarded on
//! commit or moved back on rollback.
//!
//! A working directory left behind by a hard crash is reused on the next
//! run, which is what lets per-task `is_done` probes skip work that already
//! finished.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = ".staging";
const BACKUP_SUFFIX: &str = ".bak";

/// Working/target directory pair handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    pub work_dir: PathBuf,
    pub target_dir: PathBuf,
}

/// Backup/replace/rollback guard around one item's target directory.
///
/// Exactly one of [`Stage::commit`] or [`Stage::rollback`] must be called;
/// both consume the guard.
pub struct Stage {
    target_dir: PathBuf,
    backup_dir: PathBuf,
    work_dir: PathBuf,
}

impl Stage {
    /// Move any existing target aside to a sibling backup (reversible) and
    /// ensure a working directory exists under the store's staging area.
    pub fn prepare(target_dir: &Path) -> Result<Self> {
        let name = target_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Validation(format!(
                    "target directory {} has no usable name",
                    target_dir.display()
                ))
            })?;
        let parent = target_dir.parent().ok_or_else(|| {
            Error::Validation(format!(
                "target directory {} has no parent",
                target_dir.display()
            ))
        })?;

        let backup_dir = target_dir.with_file_name(format!("{name}{BACKUP_SUFFIX}"));
        let work_dir = parent.join(STAGING_DIR).join(name);

        if target_dir.exists() {
            if backup_dir.exists() {
                fs::remove_dir_all(&backup_dir)?;
            }
            fs::rename(target_dir, &backup_dir)?;
            info!(
                target = %target_dir.display(),
                backup = %backup_dir.display(),
                "moved existing target aside"
            );
        }

        fs::create_dir_all(&work_dir)?;
        debug!(work = %work_dir.display(), "staging directory ready");

        Ok(Self {
            target_dir: target_dir.to_path_buf(),
            backup_dir,
            work_dir,
        })
    }

    pub fn context(&self) -> StageContext {
        StageContext {
            work_dir: self.work_dir.clone(),
            target_dir: self.target_dir.clone(),
        }
    }

    /// Publish the working directory as the target and discard the backup.
    pub fn commit(self) -> Result<PathBuf> {
        // Anything at the target was backed up in prepare().
        if self.target_dir.exists() {
            fs::remove_dir_all(&self.target_dir)?;
        }
        fs::rename(&self.work_dir, &self.target_dir)?;
        if self.backup_dir.exists() {
            fs::remove_dir_all(&self.backup_dir)?;
        }
        info!(target = %self.target_dir.display(), "published");
        Ok(self.target_dir)
    }

    /// Discard the working directory and restore the pre-run state exactly.
    pub fn rollback(self) -> Result<()> {
        if self.work_dir.exists() {
            fs::remove_dir_all(&self.work_dir)?;
        }
        if self.backup_dir.exists() {
            if self.target_dir.exists() {
                fs::remove_dir_all(&self.target_dir)?;
            }
            fs::rename(&self.backup_dir, &self.target_dir)?;
            info!(target = %self.target_dir.display(), "restored previous target");
        }
        Ok(())
    }
}

/// Best-effort rename of a published directory to a content-derived name.
///
/// Not part of the atomicity contract: on any failure the already-published
/// directory keeps its original name and remains valid.
pub fn rename_published(published: &Path, new_name: &str) -> PathBuf {
    let renamed = published.with_file_name(new_name);
    if renamed == published {
        return published.to_path_buf();
    }
    if renamed.exists() {
        if let Err(err) = fs::remove_dir_all(&renamed) {
            warn!(
                dir = %renamed.display(),
                error = %err,
                "could not clear rename destination; keeping published name"
            );
            return published.to_path_buf();
        }
    }
    match fs::rename(published, &renamed) {
        Ok(()) => {
            info!(from = %published.display(), to = %renamed.display(), "renamed");
            renamed
        }
        Err(err) => {
            warn!(error = %err, "rename failed; keeping published name");
            published.to_path_buf()
        }
    }
}
