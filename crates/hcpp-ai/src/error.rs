use std::path::PathBuf;

use hcpp_store::StoreError;
use thiserror::Error;

/// Failure of one language-model call. Never aborts a batch.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of one OCR call. Never aborts a batch.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR of {} exited with {status}: {stderr}", path.display())]
    Failed {
        path: PathBuf,
        status: i32,
        stderr: String,
    },
}

/// Fatal errors of a batch job: the store or the input tree is unusable.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl AiError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
