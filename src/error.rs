use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task {task} ran before dependency {dep} completed")]
    DependencyViolation { task: String, dep: String },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Catalog rejected item {item_id}: {reason}")]
    Catalog { item_id: String, reason: String },

    #[error("Pipeline for item {item_id} failed; tasks: {failed:?}")]
    Pipeline { item_id: String, failed: Vec<String> },

    #[error("Scheduler stuck; tasks blocked with unmet dependencies: {blocked:?}")]
    Stuck { blocked: Vec<String> },

    #[error("Cancelled by operator")]
    Cancelled,

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Transient transport failures worth retrying with backoff. Everything
    /// else is terminal on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
