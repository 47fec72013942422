use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("reference list not found: {0}")]
    ListNotFound(std::path::PathBuf),

    #[error("{path}: missing column '{column}'")]
    MissingColumn {
        path: std::path::PathBuf,
        column: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
