use thiserror::Error;

use crate::DocId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document {id} in collection '{collection}'")]
    NotFound { collection: String, id: DocId },

    #[error("invalid field name: {0:?}")]
    InvalidField(String),

    #[error("record did not serialize to a JSON object")]
    NotAnObject,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[cfg(feature = "duckdb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
