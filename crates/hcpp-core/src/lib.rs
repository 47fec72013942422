//! Shared records and label taxonomy for the hcpp privacy-policy study.

pub mod annotation;
pub mod capability;
pub mod disclosure;
mod error;
pub mod reference;
pub mod segment;
pub mod verdict;

pub use annotation::{AnnotationRecord, ERROR_MARKER, fields};
pub use disclosure::{
    CapabilityAssessment, DisclosureLevel, DisclosureRecord, DisclosureTally, PolicyDocument,
};
pub use error::CoreError;
pub use reference::ReferenceLists;
pub use verdict::{GroundTruth, Verdict};
