#![deny(missing_docs)]

//! Core library for the Topical long-document summarizer.

/// HTTP routing and REST handlers.
pub mod api;
/// Language-model backends and prompt construction.
pub mod backend;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Summarization metrics helpers.
pub mod metrics;
/// Document summarization pipeline.
pub mod processing;
