use thiserror::Error;

#[derive(Debug, Error)]
pub enum MlError {
    /// Embedding length is not a positive multiple of the segment width.
    /// Fatal for the whole dataset.
    #[error("{package}: embedding length {len} is not a positive multiple of {width}")]
    InvalidEmbedding {
        package: String,
        len: usize,
        width: usize,
    },

    #[error("line {line}: missing or malformed field '{field}'")]
    MissingField { line: usize, field: String },

    #[error("{package}: class label {value} is not 0 or 1")]
    InvalidLabel { package: String, value: String },

    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty dataset")]
    EmptyDataset,

    #[error("cannot split {samples} samples into {splits} stratified folds: {reason}")]
    InvalidSplit {
        samples: usize,
        splits: usize,
        reason: String,
    },

    #[error("parameter '{name}': {reason}")]
    Param { name: String, reason: String },

    #[error("{family}: every grid candidate failed to fit")]
    NoViableCandidate { family: String },

    #[error("fit failed: {0}")]
    Fit(String),
}
