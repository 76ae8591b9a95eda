//! Document pipeline: format-aware text extraction followed by PII redaction.

pub mod extract;
pub mod pii;
mod pipeline;
pub mod types;

pub use extract::TextExtractor;
pub use pii::{FilteredDocument, FilteringStats, PiiCategory, PiiFilter};
pub use pipeline::{BatchReport, BatchSummary, DocumentOutcome, DocumentPipeline, UploadResult};
pub use types::{
    BatchError, DocumentMetadata, DocumentType, ExtractionError, ExtractionResult, FailureKind,
    FailureReport, UploadedFile,
};
