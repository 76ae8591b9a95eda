//! Prompt handling: cleaning user input and assembling the final chat payload.

pub mod assembler;
pub mod cleaner;

pub use assembler::{AssembleError, AssemblyDocument, ChatAssembler, ChatPayload, DocumentInfo};
pub use cleaner::{CleanedPrompt, PromptCleaner, PromptRejection};
