//! External-classifier layer: Ollama prompts, OCR, and the batch loops that
//! persist their answers.

pub mod annotate;
pub mod disclosure;
mod error;
pub mod ocr;
pub mod ollama;
pub mod policy;
pub mod prompt;

pub use annotate::{AnnotateConfig, AnnotateStats, Evaluation, run_annotation};
pub use disclosure::{DisclosureConfig, DisclosureRun, analyze_disclosure, disclosure_summary};
pub use error::{AiError, LlmError, OcrError};
pub use ocr::{OcrEngine, TesseractOcr};
pub use ollama::{LanguageModel, OllamaApi, OllamaClient, OllamaConfig};
pub use policy::{IngestStats, PolicyIngestConfig};
pub use prompt::PromptStyle;
