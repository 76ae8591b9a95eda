//! Combines a cleaned prompt with filtered document texts into the payload handed to dispatch.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

use super::cleaner::{CleanedPrompt, PromptRejection};
use crate::processing::{DocumentOutcome, FailureKind, FailureReport};

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const DOCUMENTS_HEADER: &str = "\n\nDocument Contents:\n";
const MAX_LABEL_CHARS: usize = 120;
const UNTITLED_LABEL: &str = "untitled";

/// Errors that stop a payload from being assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// The prompt failed cleaning and must not be dispatched.
    #[error("{0}")]
    InvalidPrompt(PromptRejection),
    /// More documents were supplied than a request may carry.
    #[error("received {count} documents; at most {limit} are allowed per request")]
    TooManyDocuments {
        /// Number of documents supplied.
        count: usize,
        /// Configured maximum.
        limit: usize,
    },
}

impl AssembleError {
    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidPrompt(rejection) => rejection.kind(),
            Self::TooManyDocuments { .. } => FailureKind::SizeLimitExceeded,
        }
    }
}

impl From<&AssembleError> for FailureReport {
    fn from(error: &AssembleError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// One filtered document ready to be appended to a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyDocument {
    /// Label shown in the document header, usually the filename.
    pub label: String,
    /// Redacted document text.
    pub text: String,
}

impl AssemblyDocument {
    /// Pair a label with redacted text.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Document presence reported alongside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    /// Whether any document was appended.
    pub has_documents: bool,
    /// Number of documents appended.
    pub document_count: usize,
}

/// Final text handed to the dispatch capability plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPayload {
    /// Prompt followed by the labeled document blocks, if any.
    pub text: String,
    /// Document presence summary.
    pub document_info: DocumentInfo,
    /// Approximate token count of `text`.
    pub estimated_tokens: usize,
}

/// Builds chat payloads. Holds no per-request state.
#[derive(Clone)]
pub struct ChatAssembler {
    max_documents: usize,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for ChatAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAssembler")
            .field("max_documents", &self.max_documents)
            .finish_non_exhaustive()
    }
}

impl ChatAssembler {
    /// Build an assembler accepting up to `max_documents` documents per payload.
    ///
    /// Token estimates use the `cl100k_base` encoding; when it cannot be loaded the assembler
    /// falls back to counting whitespace-separated words.
    pub fn new(max_documents: usize) -> Self {
        let token_counter = match cl100k_base() {
            Ok(encoding) => {
                let encoding = Arc::new(encoding);
                Arc::new(move |text: &str| encoding.encode_ordinary(text).len()) as TokenCounter
            }
            Err(error) => {
                tracing::warn!(error = %error, "Tokenizer unavailable; falling back to word counts");
                word_counter()
            }
        };
        Self {
            max_documents,
            token_counter,
        }
    }

    /// Build an assembler with an explicit token counter.
    pub fn with_token_counter(
        max_documents: usize,
        counter: impl Fn(&str) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_documents,
            token_counter: Arc::new(counter),
        }
    }

    /// Combine `prompt` with `documents` in the order given.
    ///
    /// With no documents the payload text equals the prompt text verbatim.
    pub fn assemble(
        &self,
        prompt: &CleanedPrompt,
        documents: &[AssemblyDocument],
    ) -> Result<ChatPayload, AssembleError> {
        prompt.validate().map_err(AssembleError::InvalidPrompt)?;
        if documents.len() > self.max_documents {
            return Err(AssembleError::TooManyDocuments {
                count: documents.len(),
                limit: self.max_documents,
            });
        }

        let mut text = prompt.text.clone();
        if !documents.is_empty() {
            text.push_str(DOCUMENTS_HEADER);
            for (index, document) in documents.iter().enumerate() {
                text.push_str(&format!(
                    "\n--- Document {}: {} ---\n{}\n",
                    index + 1,
                    sanitize_label(&document.label),
                    document.text
                ));
            }
        }

        let estimated_tokens = (self.token_counter)(&text);
        Ok(ChatPayload {
            text,
            document_info: DocumentInfo {
                has_documents: !documents.is_empty(),
                document_count: documents.len(),
            },
            estimated_tokens,
        })
    }

    /// Assemble from pipeline outcomes, including only files that were extracted and filtered.
    pub fn assemble_outcomes(
        &self,
        prompt: &CleanedPrompt,
        outcomes: &[DocumentOutcome],
    ) -> Result<ChatPayload, AssembleError> {
        let documents: Vec<AssemblyDocument> = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .document()
                    .map(|document| AssemblyDocument::new(&outcome.metadata.filename, &document.text))
            })
            .collect();
        self.assemble(prompt, &documents)
    }
}

fn word_counter() -> TokenCounter {
    Arc::new(|text: &str| text.split_whitespace().count())
}

/// Keep labels on one line so they cannot forge a document boundary.
fn sanitize_label(label: &str) -> String {
    let flattened: String = label
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = flattened
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("---", "-");
    let label: String = collapsed.chars().take(MAX_LABEL_CHARS).collect();
    if label.is_empty() {
        UNTITLED_LABEL.to_string()
    } else {
        label
    }
}
