#![deny(missing_docs)]

//! Core library for the LLM relay: document extraction, PII redaction, prompt cleaning, and
//! payload assembly in front of hosted and local LLM providers.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// LLM provider adapters and routing.
pub mod dispatch;
/// Structured logging and tracing setup.
pub mod logging;
/// Relay activity counters.
pub mod metrics;
/// Document extraction and PII filtering pipeline.
pub mod processing;
/// Prompt cleaning and chat payload assembly.
pub mod prompt;
/// Request orchestration shared by the HTTP surface.
pub mod service;
