//! Embedding features and classifier sweeps for the privacy-policy study.
//!
//! Loads per-app segment embeddings, aggregates them into fixed-width rows
//! (mean pooling or zero padding), and grid-searches classifier families
//! under stratified K-fold cross-validation.

pub mod cv;
mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod params;
pub mod scale;
pub mod sweep;

pub use error::MlError;
pub use features::{
    AggregationMode, EmbeddingRecord, FeatureMatrix, FeatureSpec, SEGMENT_WIDTH, aggregate,
    load_records, mean_pool, zero_pad_flatten,
};
pub use metrics::FoldMetrics;
pub use model::{Classifier, ModelFamily, families_for};
pub use params::{ParamGrid, ParamSet, ParamValue};
pub use sweep::{SweepConfig, SweepResult, run_sweep};
