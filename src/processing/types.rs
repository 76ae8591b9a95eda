//! Core data types and error definitions for the document pipeline.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Failure taxonomy surfaced at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Declared type has no extraction strategy.
    UnsupportedFormat,
    /// Format-specific parse failure (corruption, encryption, malformed structure).
    UnreadableContent,
    /// File or batch exceeds a configured bound.
    SizeLimitExceeded,
    /// Prompt failed cleaning validation.
    EmptyOrInvalidPrompt,
}

/// Kind plus short human-readable reason; the only error detail that crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// Taxonomy bucket of the failure.
    pub kind: FailureKind,
    /// Short reason without library internals.
    pub reason: String,
}

impl FailureReport {
    /// Build a report from a kind and reason.
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Errors produced while turning one uploaded file into plain text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// No extraction strategy exists for the declared type.
    #[error("unsupported type: {0}")]
    UnsupportedFormat(String),
    /// The document could not be parsed; the payload is a short, library-free reason.
    #[error("unreadable document: {0}")]
    UnreadableContent(String),
    /// The file exceeded the per-file byte cap.
    #[error("file is {size} bytes, exceeding the {limit} byte limit")]
    SizeLimitExceeded {
        /// Size of the rejected file in bytes.
        size: usize,
        /// Configured per-file byte cap.
        limit: usize,
    },
}

impl ExtractionError {
    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            Self::UnreadableContent(_) => FailureKind::UnreadableContent,
            Self::SizeLimitExceeded { .. } => FailureKind::SizeLimitExceeded,
        }
    }

    pub(crate) fn unreadable(reason: impl Into<String>) -> Self {
        Self::UnreadableContent(reason.into())
    }
}

impl From<&ExtractionError> for FailureReport {
    fn from(error: &ExtractionError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Errors that reject a whole batch before any file is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// More files were submitted than a request may carry.
    #[error("received {count} files; at most {limit} are allowed per request")]
    TooManyFiles {
        /// Number of files submitted.
        count: usize,
        /// Configured maximum.
        limit: usize,
    },
}

impl BatchError {
    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::TooManyFiles { .. } => FailureKind::SizeLimitExceeded,
        }
    }
}

impl From<&BatchError> for FailureReport {
    fn from(error: &BatchError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Raw upload received from the boundary. Lives only for the request that carries it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-declared filename.
    pub filename: String,
    /// Client-declared MIME type, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Wrap raw bytes with their declared name and type.
    pub fn new(
        filename: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Size of the upload in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Resolve the extraction strategy from the declared type, falling back to the extension.
    pub fn document_type(&self) -> DocumentType {
        DocumentType::detect(self.content_type.as_deref(), &self.filename)
    }
}

/// Supported document formats, each mapped to one extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentType {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document (`.docx`).
    Word,
    /// Excel or OpenDocument workbook.
    Spreadsheet,
    /// Comma-separated values.
    Csv,
    /// Plain text in an arbitrary encoding.
    PlainText,
    /// No strategy exists; carries the declared type tag for diagnostics.
    Unsupported(String),
}

impl DocumentType {
    /// Look up the strategy for a declared MIME type and filename.
    ///
    /// The MIME type wins when it is recognized; `application/octet-stream` and unknown MIME
    /// types defer to the filename extension.
    pub fn detect(content_type: Option<&str>, filename: &str) -> Self {
        let mime = content_type
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .filter(|value| !value.is_empty());
        if let Some(found) = mime.as_deref().and_then(Self::from_mime) {
            return found;
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if let Some(found) = extension.as_deref().and_then(Self::from_extension) {
            return found;
        }

        let tag = match (mime, extension) {
            (Some(mime), _) if mime != "application/octet-stream" => mime,
            (_, Some(ext)) => format!(".{ext}"),
            (Some(mime), None) => mime,
            (None, None) => "unknown".to_string(),
        };
        Self::Unsupported(tag)
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Word)
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(Self::Spreadsheet),
            "text/csv" | "application/csv" => Some(Self::Csv),
            "text/plain" | "text/markdown" => Some(Self::PlainText),
            "application/msword" => Some(Self::Unsupported(mime.to_string())),
            _ => None,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Word),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Spreadsheet),
            "csv" => Some(Self::Csv),
            "txt" | "md" | "log" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Short tag reported in file metadata.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "docx",
            Self::Spreadsheet => "spreadsheet",
            Self::Csv => "csv",
            Self::PlainText => "txt",
            Self::Unsupported(_) => "unknown",
        }
    }
}

impl Serialize for DocumentType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Descriptive metadata attached to every per-file result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Client-declared filename.
    pub filename: String,
    /// Client-declared MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Resolved document type.
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    /// File size in bytes.
    pub size: usize,
    /// Hex SHA-256 of the raw bytes, used to correlate logs without logging content. Absent when
    /// the file was rejected by size before it was read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Whether extracted text was cut at the configured character limit.
    pub truncated: bool,
}

impl DocumentMetadata {
    /// Describe an upload before extraction.
    pub fn describe(file: &UploadedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            document_type: file.document_type(),
            size: file.size(),
            sha256: Some(hex::encode(Sha256::digest(&file.bytes))),
            truncated: false,
        }
    }

    /// Describe a file known only by name and size.
    pub fn unread(filename: impl Into<String>, size: usize) -> Self {
        let filename = filename.into();
        Self {
            document_type: DocumentType::detect(None, &filename),
            filename,
            content_type: None,
            size,
            sha256: None,
            truncated: false,
        }
    }
}

/// Outcome of extracting one file. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Metadata describing the source file.
    pub metadata: DocumentMetadata,
    /// Extracted plain text, or the reason extraction failed.
    pub outcome: Result<String, ExtractionError>,
}

impl ExtractionResult {
    /// Whether text was extracted.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
