//! Relay service coordinating the document pipeline, prompt handling, and dispatch.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::dispatch::{DispatchError, DispatchResponse, ProviderRegistry};
use crate::metrics::{MetricsSnapshot, RelayMetrics};
use crate::processing::{
    BatchError, BatchReport, DocumentPipeline, FailureKind, FailureReport, UploadedFile,
};
use crate::prompt::{
    AssembleError, AssemblyDocument, ChatAssembler, DocumentInfo, PromptCleaner,
};

/// Chat request after boundary decoding.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Raw user prompt.
    pub prompt: String,
    /// Provider selector, forwarded verbatim to dispatch.
    pub provider: String,
    /// Optional model selector, forwarded verbatim to dispatch.
    pub model: Option<String>,
    /// Document texts to append, in upload order.
    pub documents: Vec<AssemblyDocument>,
}

/// Result of a dispatched chat request.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Provider answer.
    pub response: DispatchResponse,
    /// Prompt text after cleaning and redaction.
    pub cleaned_prompt: String,
    /// Documents included in the payload.
    pub document_info: DocumentInfo,
    /// Approximate token count of the dispatched payload.
    pub estimated_tokens: usize,
    /// Placeholders written into the prompt itself.
    pub prompt_redactions: usize,
}

/// Errors surfaced by the chat flow.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The prompt was rejected or the request carried too many documents.
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    /// The provider could not serve the payload.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ChatError {
    /// Taxonomy report for core failures; `None` for dispatch failures, which are external.
    pub fn failure_report(&self) -> Option<FailureReport> {
        match self {
            Self::Assemble(error) => Some(FailureReport::from(error)),
            Self::Dispatch(_) => None,
        }
    }

    /// Taxonomy bucket for core failures.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Assemble(error) => Some(error.kind()),
            Self::Dispatch(_) => None,
        }
    }
}

/// Abstraction over the relay used by the HTTP surface.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Extract and redact a batch of uploaded files.
    async fn process_uploads(&self, files: Vec<UploadedFile>) -> Result<BatchReport, BatchError>;

    /// Clean the prompt, redact documents, assemble the payload, and dispatch it.
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ChatError>;

    /// Configured providers and the models each advertises.
    async fn available_providers(&self) -> BTreeMap<String, Vec<String>>;

    /// Maximum files accepted in one request.
    fn max_files(&self) -> usize;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the long-lived components shared by every request.
///
/// All components are immutable after construction; per-request data lives only on the stack of
/// the call that created it. Construct once near process start and share through an `Arc`.
pub struct RelayService {
    pipeline: DocumentPipeline,
    cleaner: PromptCleaner,
    assembler: ChatAssembler,
    registry: ProviderRegistry,
    metrics: Arc<RelayMetrics>,
}

impl RelayService {
    /// Build the service and register every configured provider.
    pub fn new(config: &Config) -> Result<Self, DispatchError> {
        let registry = ProviderRegistry::from_config(&config.providers)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Build the service around an explicit provider registry.
    pub fn with_registry(config: &Config, registry: ProviderRegistry) -> Self {
        let pipeline = DocumentPipeline::new(config.extraction, &config.pii);
        let mut cleaner = PromptCleaner::new(&config.prompt);
        if config.prompt.redact_pii {
            cleaner = cleaner.with_pii_filter(pipeline.filter().clone());
        }
        Self {
            pipeline,
            cleaner,
            assembler: ChatAssembler::new(config.extraction.max_files),
            registry,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }
}

#[async_trait]
impl RelayApi for RelayService {
    async fn process_uploads(&self, files: Vec<UploadedFile>) -> Result<BatchReport, BatchError> {
        let report = self.pipeline.process_concurrent(files).await?;
        self.metrics.record_batch(
            report.summary.successful as u64,
            report.summary.failed as u64,
            report.total_redactions() as u64,
        );
        Ok(report)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ChatError> {
        let ChatRequest {
            prompt,
            provider,
            model,
            documents,
        } = request;

        let cleaned = self.cleaner.clean(&prompt);
        self.metrics.record_prompt(cleaned.valid);
        cleaned.validate().map_err(AssembleError::InvalidPrompt)?;

        let limit = self.pipeline.limits().max_files;
        if documents.len() > limit {
            return Err(AssembleError::TooManyDocuments {
                count: documents.len(),
                limit,
            }
            .into());
        }

        let filter = self.pipeline.filter();
        let prompt_redactions = cleaned.redactions;

        // Client-supplied texts may not have passed through the upload pipeline; filtering is
        // idempotent, so already-redacted texts come back unchanged.
        let documents: Vec<AssemblyDocument> = documents
            .into_iter()
            .map(|document| AssemblyDocument {
                text: filter.filter(&document.text).text,
                label: document.label,
            })
            .collect();

        let payload = self.assembler.assemble(&cleaned, &documents)?;
        tracing::info!(
            provider = %provider,
            documents = payload.document_info.document_count,
            estimated_tokens = payload.estimated_tokens,
            prompt_redactions,
            "Assembled chat payload"
        );

        let response = self
            .registry
            .send(&payload.text, &provider, model.as_deref())
            .await?;
        self.metrics.record_dispatch();

        Ok(ChatOutcome {
            response,
            cleaned_prompt: cleaned.text,
            document_info: payload.document_info,
            estimated_tokens: payload.estimated_tokens,
            prompt_redactions,
        })
    }

    async fn available_providers(&self) -> BTreeMap<String, Vec<String>> {
        self.registry.available().await
    }

    fn max_files(&self) -> usize {
        self.pipeline.limits().max_files
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
