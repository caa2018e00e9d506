//! Core data types and error definitions for the summarization pipeline.

use crate::backend::BackendError;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Literal returned when a document contains nothing to summarize.
pub const NO_CONTENT_MESSAGE: &str = "No content to summarize";

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The caller configured an impossible chunk size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors that escape the pipeline.
///
/// Per-chunk failures and reduce failures never show up here; they degrade into markers
/// and a labeled fallback instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document could not be chunked.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Single-pass summarization failed and there is nothing to fall back to.
    #[error("Failed to generate summary: {0}")]
    Backend(#[from] BackendError),
    /// The caller cancelled the run.
    #[error("Summarization cancelled")]
    Cancelled,
    /// The run exceeded its configured deadline.
    #[error("Summarization timed out after {0:?}")]
    TimedOut(Duration),
}

/// Immutable input to one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Raw text of arbitrary length.
    pub text: String,
    /// Optional topic used as prompt context only.
    pub topic: Option<String>,
}

impl Document {
    /// Build a document from text and an optional topic.
    pub fn new(text: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            text: text.into(),
            topic,
        }
    }

    /// Topic as a borrowed string, if any.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// True when the text is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Ordered segment of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    /// Byte offset of the first character (inclusive).
    pub start: usize,
    /// Byte offset one past the last character (exclusive).
    pub end: usize,
    /// The substring `&document[start..end]`.
    pub text: &'a str,
}

/// What happened to one chunk during the map phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The backend produced a summary.
    Summary(String),
    /// Retries were exhausted or the failure was fatal.
    Unavailable {
        /// Failure text carried into the visible marker.
        reason: String,
    },
}

/// Result of summarizing one [`Chunk`]; exactly one per chunk, in chunk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Index of the chunk this summary belongs to.
    pub index: usize,
    /// Summary text or unavailable marker.
    pub outcome: ChunkOutcome,
}

impl ChunkSummary {
    /// Successful summary for chunk `index`.
    pub fn summary(index: usize, text: String) -> Self {
        Self {
            index,
            outcome: ChunkOutcome::Summary(text),
        }
    }

    /// Unavailable marker for chunk `index`.
    pub fn unavailable(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            outcome: ChunkOutcome::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// Whether the chunk ended without a summary.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Unavailable { .. })
    }

    /// Text used when joining section summaries; failures render as a visible marker.
    pub fn render(&self) -> Cow<'_, str> {
        match &self.outcome {
            ChunkOutcome::Summary(text) => Cow::Borrowed(text),
            ChunkOutcome::Unavailable { reason } => Cow::Owned(format!(
                "[Chunk {} summary unavailable: {reason}]",
                self.index + 1
            )),
        }
    }
}

/// How the final summary was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Nothing to summarize; the summary is [`NO_CONTENT_MESSAGE`].
    NoContent,
    /// The whole document fit in one request.
    SinglePass,
    /// Chunks were summarized and, when there were several, reduced into one synthesis.
    Combined,
    /// The reduce step failed; the summary is the labeled concatenation of chunk summaries.
    ReduceFallback,
}

/// Final result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutcome {
    /// Non-empty summary text.
    pub summary: String,
    /// Model identifier of the backend that produced it.
    pub model: String,
    /// How the summary was produced.
    pub kind: SummaryKind,
    /// Number of chunks the document was split into (zero for single pass and no content).
    pub chunk_count: usize,
    /// Chunks that ended as unavailable markers.
    pub unavailable_chunks: usize,
}

/// Per-request overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryOptions {
    /// Chunk size in characters; defaults to the backend's configured size.
    pub chunk_size: Option<usize>,
}
