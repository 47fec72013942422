//! Record store: typed document collections over in-memory or DuckDB storage.

mod document;
mod error;
mod memory;

pub use document::{Collection, DocId, Document, DocumentStore, Filter, to_document};
pub use error::StoreError;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
