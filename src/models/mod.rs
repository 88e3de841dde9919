pub mod export;
pub mod snippet;
pub mod storage;
pub mod store;
pub mod tags;

pub use export::{ExportFormat, export_snippets, import_snippets};
pub use snippet::Snippet;
pub use storage::StorageManager;
pub use store::{ImportSummary, LoadReport, SnippetStore, ValidationPolicy};
