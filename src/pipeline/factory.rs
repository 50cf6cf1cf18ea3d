//! Builds one item's task graph from its asset manifest.
//!
//! Layout inside the working directory:
//!
//! ```text
//! downloads/        raw bytes as fetched
//! decrypted/        archives normalized to the container format
//! preview/          extracted preview tree
//! export/           extracted export tree (when available)
//! thumbnailImage/   placed thumbnail
//! previewImages/    placed preview images
//! detail.json       raw catalog blob
//! version.json      completion marker, written last
//! ```

use crate::catalog::{self, AssetManifest};
use crate::core::graph::TaskGraph;
use crate::failures::FailureLog;
use crate::pipeline::{
    CopyImageTask, DecryptTask, DownloadFlow, DownloadTask, ExtractTask, SaveDetailTask,
    SaveVersionTask,
};
use crate::retry::RetryPolicy;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct TaskFactory {
    item_id: String,
    work_dir: PathBuf,
    http: reqwest::Client,
    policy: RetryPolicy,
    failure_log: Arc<FailureLog>,
}

impl TaskFactory {
    pub fn new(
        item_id: &str,
        work_dir: PathBuf,
        http: reqwest::Client,
        policy: RetryPolicy,
        failure_log: Arc<FailureLog>,
    ) -> Self {
        Self {
            item_id: item_id.to_string(),
            work_dir,
            http,
            policy,
            failure_log,
        }
    }

    /// Build the full graph for one item.
    ///
    /// Per-chain dependencies: download → decrypt → extract for archives,
    /// download → place for images. The version marker depends on the detail
    /// blob and every extract task, making it the graph's sink for the model
    /// name.
    pub fn build(&self, manifest: &AssetManifest, detail: &Value) -> TaskGraph {
        let mut graph = TaskGraph::new();
        let downloads_dir = self.work_dir.join("downloads");
        let decrypted_dir = self.work_dir.join("decrypted");

        let detail_id = format!("save-detail-{}", self.item_id);
        graph.add(Arc::new(SaveDetailTask::new(
            &detail_id,
            self.work_dir.join("detail.json"),
            detail.clone(),
        )));

        let mut marker_deps = vec![detail_id];

        if let Some(archive) = &manifest.preview_archive {
            marker_deps.push(self.add_archive_chain(
                &mut graph,
                "preview",
                &catalog::asset_url(&self.item_id, &archive.file_name),
                &archive.file_name,
                DownloadFlow::Stored,
                &downloads_dir,
                &decrypted_dir,
            ));
        }

        if let Some(export) = &manifest.export {
            marker_deps.push(self.add_archive_chain(
                &mut graph,
                "export",
                &catalog::export_download_url(&export.item_content_id),
                "export.zip",
                DownloadFlow::Export {
                    file_name: "export.zip".to_string(),
                },
                &downloads_dir,
                &decrypted_dir,
            ));
        }

        if let Some(thumbnail) = &manifest.thumbnail {
            self.add_image_chain(
                &mut graph,
                "thumb",
                "thumbnail",
                &catalog::asset_url(&self.item_id, &thumbnail.file_name),
                &downloads_dir.join(format!("thumb_{}", thumbnail.file_name)),
                &self.work_dir.join("thumbnailImage").join(&thumbnail.file_name),
            );
        }

        for (index, image) in manifest.preview_images.iter().enumerate() {
            self.add_image_chain(
                &mut graph,
                &format!("preview-img-{index}"),
                "preview-image",
                &catalog::preview_image_url(&self.item_id, &image.file_name),
                &downloads_dir.join(format!("preview_{index}_{}", image.file_name)),
                &self.work_dir.join("previewImages").join(&image.file_name),
            );
        }

        graph.add(Arc::new(SaveVersionTask::new(
            &format!("save-version-{}", self.item_id),
            self.work_dir.clone(),
            &self.item_id,
            marker_deps,
        )));

        debug!(item = %self.item_id, tasks = graph.len(), "task graph built");
        graph
    }

    /// download → decrypt → extract; returns the extract task's id.
    #[allow(clippy::too_many_arguments)]
    fn add_archive_chain(
        &self,
        graph: &mut TaskGraph,
        chain: &str,
        url: &str,
        file_name: &str,
        flow: DownloadFlow,
        downloads_dir: &Path,
        decrypted_dir: &Path,
    ) -> String {
        let download_id = format!("download-{chain}-{}", self.item_id);
        let decrypt_id = format!("decrypt-{chain}-{}", self.item_id);
        let extract_id = format!("extract-{chain}-{}", self.item_id);

        let raw_path = downloads_dir.join(file_name);
        let container_path = decrypted_dir.join(format!("{chain}_{}.zip", self.item_id));

        graph.add(Arc::new(DownloadTask::new(
            &download_id,
            &self.item_id,
            &format!("{chain}-archive"),
            url,
            raw_path.clone(),
            flow,
            self.http.clone(),
            self.policy.clone(),
            Arc::clone(&self.failure_log),
        )));
        graph.add(Arc::new(DecryptTask::new(
            &decrypt_id,
            raw_path,
            container_path.clone(),
            &download_id,
        )));
        graph.add(Arc::new(ExtractTask::new(
            &extract_id,
            container_path,
            self.work_dir.join(chain),
            &decrypt_id,
        )));

        extract_id
    }

    /// download → place for a single image.
    fn add_image_chain(
        &self,
        graph: &mut TaskGraph,
        chain: &str,
        kind: &str,
        url: &str,
        scratch_path: &Path,
        final_path: &Path,
    ) {
        let download_id = format!("download-{chain}-{}", self.item_id);
        let place_id = format!("place-{chain}-{}", self.item_id);

        graph.add(Arc::new(DownloadTask::new(
            &download_id,
            &self.item_id,
            kind,
            url,
            scratch_path.to_path_buf(),
            DownloadFlow::Stored,
            self.http.clone(),
            self.policy.clone(),
            Arc::clone(&self.failure_log),
        )));
        graph.add(Arc::new(CopyImageTask::new(
            &place_id,
            scratch_path.to_path_buf(),
            final_path.to_path_buf(),
            &download_id,
        )));
    }
}
