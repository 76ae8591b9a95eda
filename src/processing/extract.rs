//! Text extraction: raw bytes plus a declared type in, plain text out.
//!
//! Each supported [`DocumentType`] maps to one strategy module. Strategies never panic outward
//! and never leak parser internals; library errors are logged and replaced by a short reason.

mod delimited;
mod pdf;
mod plain;
mod spreadsheet;
mod word;

use crate::config::ExtractionLimits;

use super::types::{DocumentMetadata, DocumentType, ExtractionError, ExtractionResult, UploadedFile};

/// Marker placed between consecutive PDF pages.
pub const PAGE_BREAK: &str = "\n\n[page break]\n\n";

/// Converts uploaded files into plain text according to their declared type.
#[derive(Debug, Clone, Copy)]
pub struct TextExtractor {
    limits: ExtractionLimits,
}

impl TextExtractor {
    /// Build an extractor bound to the given limits.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Limits this extractor enforces.
    pub fn limits(&self) -> ExtractionLimits {
        self.limits
    }

    /// Extract text from raw bytes using the strategy for `declared_type`.
    ///
    /// The byte cap is checked before any parsing. Blank results are reported as unreadable so
    /// callers never receive an empty success.
    pub fn extract(
        &self,
        bytes: &[u8],
        declared_type: &DocumentType,
    ) -> Result<String, ExtractionError> {
        if bytes.len() > self.limits.max_file_bytes {
            return Err(ExtractionError::SizeLimitExceeded {
                size: bytes.len(),
                limit: self.limits.max_file_bytes,
            });
        }

        let text = match declared_type {
            DocumentType::Pdf => pdf::extract(bytes)?,
            DocumentType::Word => word::extract(bytes)?,
            DocumentType::Spreadsheet => spreadsheet::extract(bytes)?,
            DocumentType::Csv => delimited::extract(bytes)?,
            DocumentType::PlainText => plain::decode(bytes),
            DocumentType::Unsupported(tag) => {
                return Err(ExtractionError::UnsupportedFormat(tag.clone()));
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractionError::unreadable("no extractable text"));
        }
        Ok(trimmed.to_string())
    }

    /// Extract an uploaded file, attaching metadata and applying the character limit.
    pub fn extract_file(&self, file: &UploadedFile) -> ExtractionResult {
        let mut metadata = DocumentMetadata::describe(file);
        let outcome = self
            .extract(&file.bytes, &metadata.document_type)
            .map(|text| {
                let (text, truncated) = truncate_chars(text, self.limits.max_extracted_chars);
                metadata.truncated = truncated;
                text
            });

        match &outcome {
            Ok(text) => tracing::debug!(
                filename = %metadata.filename,
                doc_type = metadata.document_type.as_str(),
                size = metadata.size,
                chars = text.chars().count(),
                truncated = metadata.truncated,
                "Extracted document text"
            ),
            Err(error) => tracing::info!(
                filename = %metadata.filename,
                doc_type = metadata.document_type.as_str(),
                size = metadata.size,
                kind = ?error.kind(),
                "Extraction failed"
            ),
        }

        ExtractionResult { metadata, outcome }
    }
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut text = text;
            text.truncate(cut);
            (text, true)
        }
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::FailureKind;

    fn extractor() -> TextExtractor {
        TextExtractor::new(ExtractionLimits::default())
    }

    #[test]
    fn unsupported_type_is_a_failure_not_a_panic() {
        let error = extractor()
            .extract(b"\x89PNG", &DocumentType::Unsupported("image/png".into()))
            .expect_err("unsupported");
        assert_eq!(error.kind(), FailureKind::UnsupportedFormat);
        assert_eq!(error.to_string(), "unsupported type: image/png");
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let extractor = TextExtractor::new(ExtractionLimits {
            max_file_bytes: 4,
            ..ExtractionLimits::default()
        });
        let error = extractor
            .extract(b"%PDF-garbage", &DocumentType::Pdf)
            .expect_err("too large");
        assert_eq!(
            error,
            ExtractionError::SizeLimitExceeded { size: 12, limit: 4 }
        );
    }

    #[test]
    fn blank_documents_are_unreadable() {
        let error = extractor()
            .extract(b"  \n\t ", &DocumentType::PlainText)
            .expect_err("blank");
        assert_eq!(error.kind(), FailureKind::UnreadableContent);
    }

    #[test]
    fn extract_file_truncates_and_flags() {
        let extractor = TextExtractor::new(ExtractionLimits {
            max_extracted_chars: 5,
            ..ExtractionLimits::default()
        });
        let file = UploadedFile::new("long.txt", None, "héllo world".as_bytes().to_vec());
        let result = extractor.extract_file(&file);
        assert_eq!(result.outcome.as_deref(), Ok("héllo"));
        assert!(result.metadata.truncated);
        assert_eq!(result.metadata.filename, "long.txt");
    }

    #[test]
    fn corrupted_samples_of_every_binary_type_are_unreadable() {
        let extractor = extractor();
        for doc_type in [DocumentType::Pdf, DocumentType::Word, DocumentType::Spreadsheet] {
            let error = extractor
                .extract(b"PK\x03\x04 truncated archive", &doc_type)
                .expect_err("corrupt input");
            assert_eq!(error.kind(), FailureKind::UnreadableContent, "{doc_type:?}");
            assert!(error.to_string().starts_with("unreadable document"));
        }
    }
}
