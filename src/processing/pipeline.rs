//! Per-request document pipeline: Extractor → PII Filter for each file, order-preserving.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{ExtractionLimits, PiiConfig};

use super::extract::TextExtractor;
use super::pii::{FilteredDocument, FilteringStats, PiiFilter};
use super::types::{
    BatchError, DocumentMetadata, ExtractionError, FailureReport, UploadedFile,
};

/// Result for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    /// Metadata describing the source file.
    pub metadata: DocumentMetadata,
    /// Filtered text, or the reason the file could not be processed.
    pub result: Result<FilteredDocument, ExtractionError>,
}

impl DocumentOutcome {
    /// Whether the file was extracted and filtered.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Filtered document, when processing succeeded.
    pub fn document(&self) -> Option<&FilteredDocument> {
        self.result.as_ref().ok()
    }
}

/// Totals for a batch. `successful + failed == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Files submitted.
    pub total_files: usize,
    /// Files extracted and filtered.
    pub successful: usize,
    /// Files that failed size checks or extraction.
    pub failed: usize,
}

/// Ordered per-file outcomes plus their summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// One outcome per submitted file, in upload order.
    pub outcomes: Vec<DocumentOutcome>,
    /// Reconciled totals.
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Summarize outcomes that were produced in upload order.
    pub fn from_outcomes(outcomes: Vec<DocumentOutcome>) -> Self {
        let successful = outcomes.iter().filter(|outcome| outcome.is_success()).count();
        let summary = BatchSummary {
            total_files: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
        };
        Self { outcomes, summary }
    }

    /// Total placeholders written across all successful files.
    pub fn total_redactions(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(DocumentOutcome::document)
            .map(|document| document.stats.total_redactions)
            .sum()
    }

    /// Serializable per-file view in upload order.
    pub fn results(&self) -> Vec<UploadResult> {
        self.outcomes.iter().map(UploadResult::from).collect()
    }
}

/// Per-file response shape handed to the upload boundary.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    /// Whether the file was extracted and filtered.
    pub success: bool,
    /// Client-declared filename.
    pub filename: String,
    /// Redacted text, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_text: Option<String>,
    /// Failure kind and reason, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
    /// File metadata.
    pub metadata: DocumentMetadata,
    /// Whether any PII placeholder was written.
    pub pii_detected: bool,
    /// Per-category counts, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtering_stats: Option<FilteringStats>,
}

impl From<&DocumentOutcome> for UploadResult {
    fn from(outcome: &DocumentOutcome) -> Self {
        let (filtered_text, error, filtering_stats) = match &outcome.result {
            Ok(document) => (Some(document.text.clone()), None, Some(document.stats.clone())),
            Err(error) => (None, Some(FailureReport::from(error)), None),
        };
        Self {
            success: outcome.is_success(),
            filename: outcome.metadata.filename.clone(),
            pii_detected: filtering_stats
                .as_ref()
                .is_some_and(|stats| stats.any_detected),
            filtered_text,
            error,
            metadata: outcome.metadata.clone(),
            filtering_stats,
        }
    }
}

/// Orchestrates extraction and filtering for the files of one request.
///
/// The pipeline holds only immutable configuration and compiled patterns, so clones can be
/// moved onto blocking worker threads freely.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    extractor: TextExtractor,
    filter: PiiFilter,
}

impl DocumentPipeline {
    /// Build a pipeline from explicit limits and detector configuration.
    pub fn new(limits: ExtractionLimits, pii: &PiiConfig) -> Self {
        Self {
            extractor: TextExtractor::new(limits),
            filter: PiiFilter::new(pii),
        }
    }

    /// PII filter used for document text.
    pub fn filter(&self) -> &PiiFilter {
        &self.filter
    }

    /// Limits enforced by this pipeline.
    pub fn limits(&self) -> ExtractionLimits {
        self.extractor.limits()
    }

    /// Outcome for a file whose on-disk size already exceeds the byte cap, so it is never read.
    ///
    /// Returns `None` when `size` is within the cap.
    pub fn reject_oversized(&self, filename: &str, size: usize) -> Option<DocumentOutcome> {
        let limit = self.extractor.limits().max_file_bytes;
        if size <= limit {
            return None;
        }
        Some(DocumentOutcome {
            metadata: DocumentMetadata::unread(filename, size),
            result: Err(ExtractionError::SizeLimitExceeded { size, limit }),
        })
    }

    /// Reject batches over the file-count cap before any file is touched.
    pub fn check_batch(&self, count: usize) -> Result<(), BatchError> {
        let limit = self.extractor.limits().max_files;
        if count > limit {
            return Err(BatchError::TooManyFiles { count, limit });
        }
        Ok(())
    }

    /// Process one file: extract, then filter only on success.
    pub fn process_file(&self, file: &UploadedFile) -> DocumentOutcome {
        let extraction = self.extractor.extract_file(file);
        let result = extraction
            .outcome
            .map(|text| self.filter.filter(&text));
        if let Ok(document) = &result {
            tracing::debug!(
                filename = %extraction.metadata.filename,
                sha256 = ?extraction.metadata.sha256,
                redactions = document.stats.total_redactions,
                "Filtered document"
            );
        }
        DocumentOutcome {
            metadata: extraction.metadata,
            result,
        }
    }

    /// Process a batch sequentially on the calling thread.
    pub fn process(&self, files: &[UploadedFile]) -> Result<BatchReport, BatchError> {
        self.check_batch(files.len())?;
        let outcomes = files.iter().map(|file| self.process_file(file)).collect();
        let report = BatchReport::from_outcomes(outcomes);
        log_summary(&report);
        Ok(report)
    }

    /// Process a batch with one blocking task per file, collecting results in upload order.
    ///
    /// A task that panics yields an unreadable-content outcome for its file only.
    pub async fn process_concurrent(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<BatchReport, BatchError> {
        self.check_batch(files.len())?;

        // Only the abort fallback describes a file here; workers hash on the blocking pool.
        let files: Vec<Arc<UploadedFile>> = files.into_iter().map(Arc::new).collect();
        let tasks = files.iter().map(|file| {
            let pipeline = self.clone();
            let file = Arc::clone(file);
            tokio::task::spawn_blocking(move || pipeline.process_file(&file))
        });

        let outcomes = join_all(tasks)
            .await
            .into_iter()
            .zip(&files)
            .map(|(joined, file)| {
                joined.unwrap_or_else(|error| {
                    let metadata = DocumentMetadata::describe(file);
                    tracing::error!(
                        filename = %metadata.filename,
                        error = %error,
                        "Document task aborted"
                    );
                    DocumentOutcome {
                        metadata,
                        result: Err(ExtractionError::unreadable("document processing aborted")),
                    }
                })
            })
            .collect();

        let report = BatchReport::from_outcomes(outcomes);
        log_summary(&report);
        Ok(report)
    }
}

fn log_summary(report: &BatchReport) {
    tracing::info!(
        total = report.summary.total_files,
        successful = report.summary.successful,
        failed = report.summary.failed,
        redactions = report.total_redactions(),
        "Processed document batch"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::{DocumentType, FailureKind};

    fn pipeline() -> DocumentPipeline {
        DocumentPipeline::new(ExtractionLimits::default(), &PiiConfig::default())
    }

    fn csv_file() -> UploadedFile {
        UploadedFile::new(
            "contacts.csv",
            Some("text/csv".into()),
            b"name,email\nA,a@x.com".to_vec(),
        )
    }

    fn corrupt_pdf() -> UploadedFile {
        UploadedFile::new(
            "broken.pdf",
            Some("application/pdf".into()),
            b"%PDF-1.4\n%\xE2\xE3 truncated".to_vec(),
        )
    }

    #[test]
    fn six_files_are_rejected_before_extraction() {
        let files = vec![csv_file(); 6];
        let error = pipeline().process(&files).expect_err("too many");
        assert_eq!(error, BatchError::TooManyFiles { count: 6, limit: 5 });
        assert_eq!(error.kind(), FailureKind::SizeLimitExceeded);
    }

    #[test]
    fn partial_failure_keeps_processing_and_reconciles() {
        let report = pipeline()
            .process(&[csv_file(), corrupt_pdf()])
            .expect("batch");

        assert_eq!(report.summary.total_files, 2);
        assert_eq!(report.summary.successful, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(
            report.summary.successful + report.summary.failed,
            report.summary.total_files
        );

        let csv = report.outcomes[0].document().expect("csv success");
        assert!(csv.text.contains("[EMAIL_REDACTED]"));
        assert!(!csv.text.contains("a@x.com"));
        assert_eq!(csv.stats.email_count, 1);

        let pdf = &report.outcomes[1];
        assert_eq!(pdf.metadata.filename, "broken.pdf");
        assert_eq!(
            pdf.result.as_ref().expect_err("pdf failure").kind(),
            FailureKind::UnreadableContent
        );
    }

    #[test]
    fn empty_batch_is_valid() {
        let report = pipeline().process(&[]).expect("empty batch");
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary.total_files, 0);
    }

    #[test]
    fn oversized_file_fails_alone() {
        let pipeline = DocumentPipeline::new(
            ExtractionLimits {
                max_file_bytes: 16,
                ..ExtractionLimits::default()
            },
            &PiiConfig::default(),
        );
        let big = UploadedFile::new("big.txt", None, vec![b'a'; 64]);
        let small = UploadedFile::new("small.txt", None, b"hello".to_vec());
        let report = pipeline.process(&[big, small]).expect("batch");
        assert_eq!(
            report.outcomes[0].result.as_ref().expect_err("too big").kind(),
            FailureKind::SizeLimitExceeded
        );
        assert!(report.outcomes[1].is_success());
    }

    #[test]
    fn upload_results_expose_boundary_shape() {
        let report = pipeline()
            .process(&[csv_file(), corrupt_pdf()])
            .expect("batch");
        let results = report.results();
        let json = serde_json::to_value(&results).expect("json");

        assert_eq!(json[0]["success"], true);
        assert_eq!(json[0]["pii_detected"], true);
        assert_eq!(json[0]["filtering_stats"]["email_count"], 1);
        assert_eq!(json[0]["metadata"]["type"], "csv");
        assert_eq!(json[1]["success"], false);
        assert_eq!(json[1]["error"]["kind"], "unreadable_content");
        assert!(json[1].get("filtered_text").is_none());
    }

    #[tokio::test]
    async fn concurrent_processing_preserves_upload_order() {
        let files = vec![
            UploadedFile::new("one.txt", None, b"first 555-123-4567".to_vec()),
            corrupt_pdf(),
            UploadedFile::new("three.txt", None, b"third".to_vec()),
            csv_file(),
        ];
        let sequential = pipeline().process(&files).expect("sequential");
        let concurrent = pipeline()
            .process_concurrent(files)
            .await
            .expect("concurrent");

        assert_eq!(concurrent, sequential);
        let names: Vec<_> = concurrent
            .outcomes
            .iter()
            .map(|outcome| outcome.metadata.filename.as_str())
            .collect();
        assert_eq!(names, ["one.txt", "broken.pdf", "three.txt", "contacts.csv"]);
    }

    #[test]
    fn oversized_files_can_be_rejected_unread() {
        let pipeline = DocumentPipeline::new(
            ExtractionLimits {
                max_file_bytes: 10,
                ..ExtractionLimits::default()
            },
            &PiiConfig::default(),
        );
        assert!(pipeline.reject_oversized("small.txt", 10).is_none());

        let outcome = pipeline.reject_oversized("huge.pdf", 11).expect("rejected");
        assert_eq!(
            outcome.result,
            Err(ExtractionError::SizeLimitExceeded { size: 11, limit: 10 })
        );
        assert_eq!(outcome.metadata.document_type, DocumentType::Pdf);
        assert!(outcome.metadata.sha256.is_none());
    }

    #[tokio::test]
    async fn concurrent_metadata_carries_worker_hash() {
        let file = UploadedFile::new("big.txt", None, vec![b'x'; 256 * 1024]);
        let expected = DocumentMetadata::describe(&file);
        let report = pipeline()
            .process_concurrent(vec![file])
            .await
            .expect("concurrent");

        assert_eq!(report.outcomes[0].metadata.sha256, expected.sha256);
        assert_eq!(report.outcomes[0].metadata.size, 256 * 1024);
    }

    #[tokio::test]
    async fn concurrent_processing_checks_count_first() {
        let error = pipeline()
            .process_concurrent(vec![csv_file(); 7])
            .await
            .expect_err("too many");
        assert_eq!(error.kind(), FailureKind::SizeLimitExceeded);
    }
}
