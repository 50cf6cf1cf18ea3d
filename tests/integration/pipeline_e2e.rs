//! End-to-end pipeline over a staged archive: download (satisfied from
//! disk) → decrypt → extract → marker, committed atomically and renamed
//! with the discovered model name. No network is touched.

use nizima_fetch::commit::{rename_published, Stage};
use nizima_fetch::core::graph::TaskGraph;
use nizima_fetch::core::scheduler::{DrainOutcome, Scheduler};
use nizima_fetch::failures::FailureLog;
use nizima_fetch::marker::{self, VersionMarker};
use nizima_fetch::pipeline::decrypt::xor_transform;
use nizima_fetch::pipeline::{
    DecryptTask, DownloadFlow, DownloadTask, ExtractTask, SaveVersionTask,
};
use nizima_fetch::retry::RetryPolicy;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn model_archive() -> Vec<u8> {
    let cursor = std::io::Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(cursor);
    writer
        .start_file("haru/haru.moc3", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"moc3 bytes").unwrap();
    writer
        .start_file("haru/textures/texture_00.png", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"png bytes").unwrap();
    writer.finish().unwrap().into_inner()
}

fn build_graph(work_dir: &Path, store: &Path) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(Arc::new(DownloadTask::new(
        "download-preview-12345",
        "12345",
        "preview-archive",
        "https://example.invalid/preview.bin",
        work_dir.join("downloads/preview.bin"),
        DownloadFlow::Stored,
        reqwest::Client::new(),
        RetryPolicy::default(),
        Arc::new(FailureLog::new(store)),
    )));
    graph.add(Arc::new(DecryptTask::new(
        "decrypt-preview-12345",
        work_dir.join("downloads/preview.bin"),
        work_dir.join("decrypted/preview_12345.zip"),
        "download-preview-12345",
    )));
    graph.add(Arc::new(ExtractTask::new(
        "extract-preview-12345",
        work_dir.join("decrypted/preview_12345.zip"),
        work_dir.join("preview"),
        "decrypt-preview-12345",
    )));
    graph.add(Arc::new(SaveVersionTask::new(
        "save-version-12345",
        work_dir.to_path_buf(),
        "12345",
        vec!["extract-preview-12345".to_string()],
    )));
    graph
}

async fn run_item(store: &Path, archive_bytes: &[u8]) -> std::path::PathBuf {
    let target = store.join("12345");
    let stage = Stage::prepare(&target).unwrap();
    let work_dir = stage.context().work_dir;

    // The archive is already on disk, as after an interrupted run; the
    // download task is satisfied without network access.
    fs::create_dir_all(work_dir.join("downloads")).unwrap();
    fs::write(work_dir.join("downloads/preview.bin"), archive_bytes).unwrap();

    let graph = Arc::new(RwLock::new(build_graph(&work_dir, store)));
    let outcome = Scheduler::new(Arc::clone(&graph), 5, CancellationToken::new())
        .run()
        .await
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);

    let model_name = {
        let graph = graph.read().await;
        graph
            .output_of("extract-preview-12345")
            .and_then(|output| output.model_name().map(str::to_string))
    };

    let published = stage.commit().unwrap();
    match model_name {
        Some(name) => rename_published(&published, &format!("12345_{name}")),
        None => published,
    }
}

#[tokio::test]
async fn test_obscured_archive_lands_published_and_renamed() {
    let store = tempfile::TempDir::new().unwrap();
    let obscured = xor_transform(&model_archive());

    let final_dir = run_item(store.path(), &obscured).await;

    assert_eq!(final_dir, store.path().join("12345_haru"));
    assert_eq!(
        fs::read(final_dir.join("preview/haru/haru.moc3")).unwrap(),
        b"moc3 bytes"
    );
    assert!(final_dir.join("preview/haru/textures/texture_00.png").exists());

    let marker = VersionMarker::read(&final_dir).unwrap();
    assert!(marker.is_current());
    assert_eq!(marker.model_name, Some("haru".to_string()));

    // The marker is found under the renamed variant on the next run.
    assert!(marker::is_item_current("12345", store.path()));

    // No staging or backup debris.
    assert!(!store.path().join(".staging/12345").exists());
    assert!(!store.path().join("12345").exists());
}

#[tokio::test]
async fn test_plain_archive_skips_the_keyed_transform() {
    let store = tempfile::TempDir::new().unwrap();

    let final_dir = run_item(store.path(), &model_archive()).await;

    assert!(final_dir.join("preview/haru/haru.moc3").exists());
    assert!(marker::is_item_current("12345", store.path()));
}
