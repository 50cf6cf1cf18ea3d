//! Catalog lookup: item metadata and asset locators.
//!
//! The execution engine only needs the mapping from asset kind to source
//! locator and target name that [`AssetManifest`] carries; everything about
//! the catalog's HTTP shape stays inside this module.

use crate::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const CATALOG_BASE_URL: &str = "https://nizima.com/api";
const ASSET_BASE_URL: &str = "https://storage.googleapis.com/market_view_useritems";

/// Key of the export-archive entry inside the item content details.
const EXPORT_DATA_KEY: &str = "書き出しデータ";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A downloadable file referenced by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub file_name: String,
}

/// Reference to the export archive. Downloading it is a two-step flow keyed
/// by the item content id, not a direct object fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRef {
    pub item_content_id: String,
}

/// Asset metadata for one catalog item: what exists and where it lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    pub item_id: String,
    pub preview_archive: Option<RemoteFile>,
    pub export: Option<ExportRef>,
    pub thumbnail: Option<RemoteFile>,
    pub preview_images: Vec<RemoteFile>,
}

impl AssetManifest {
    /// Derive the manifest from a detail blob.
    ///
    /// The export archive needs account credentials the tool does not
    /// manage, so it is only referenced when the catalog marks it
    /// downloadable or `attempt_export` forces the attempt.
    pub fn from_detail(item_id: &str, detail: &Value, attempt_export: bool) -> Result<Self> {
        let assets = detail.get("assetsInfo").ok_or_else(|| Error::Catalog {
            item_id: item_id.to_string(),
            reason: "response is missing assetsInfo".to_string(),
        })?;

        let export = detail
            .get("itemContentDetails")
            .and_then(|details| details.get(EXPORT_DATA_KEY))
            .and_then(|info| {
                let downloadable = info
                    .get("isDownloadable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if !(downloadable || attempt_export) {
                    return None;
                }
                json_id(info.get("itemContentId")?)
                    .map(|item_content_id| ExportRef { item_content_id })
            });

        Ok(Self {
            item_id: item_id.to_string(),
            preview_archive: remote_file(assets.get("previewLive2DZip")),
            export,
            thumbnail: remote_file(assets.get("thumbnailImage")),
            preview_images: assets
                .get("previewImages")
                .and_then(Value::as_array)
                .map(|images| images.iter().filter_map(|img| remote_file(Some(img))).collect())
                .unwrap_or_default(),
        })
    }
}

fn remote_file(value: Option<&Value>) -> Option<RemoteFile> {
    value
        .and_then(|v| v.get("fileName"))
        .and_then(Value::as_str)
        .map(|file_name| RemoteFile {
            file_name: file_name.to_string(),
        })
}

/// Catalog ids appear both as JSON strings and as numbers.
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Source locator for a stored asset file.
pub fn asset_url(item_id: &str, file_name: &str) -> String {
    format!("{ASSET_BASE_URL}/{item_id}/{file_name}")
}

/// Preview images live under an `images/` prefix of the item's objects.
pub fn preview_image_url(item_id: &str, file_name: &str) -> String {
    format!("{ASSET_BASE_URL}/{item_id}/images/{file_name}")
}

/// Entry point of the two-step export download flow.
pub fn export_download_url(item_content_id: &str) -> String {
    format!("{CATALOG_BASE_URL}/items/{item_content_id}/download")
}

/// Thin HTTP adapter over the catalog API.
pub struct CatalogClient {
    http: reqwest::Client,
}

impl CatalogClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Shared client reused by download tasks.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch an item's detail blob and derive its asset manifest.
    ///
    /// The catalog answers unknown ids with an HTML page rather than an
    /// error status, so a non-JSON content type is rejected here.
    pub async fn item_detail(
        &self,
        item_id: &str,
        attempt_export: bool,
    ) -> Result<(AssetManifest, Value)> {
        let url = format!("{CATALOG_BASE_URL}/items/{item_id}/detail");
        let response = self.http.get(&url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("application/json") {
            return Err(Error::Catalog {
                item_id: item_id.to_string(),
                reason: format!("non-JSON response (content-type: {content_type})"),
            });
        }

        let detail: Value = response.json().await?;
        let manifest = AssetManifest::from_detail(item_id, &detail, attempt_export)?;
        debug!(item = item_id, "catalog detail fetched");
        Ok((manifest, detail))
    }
}
