//! Summarization pipeline: chunking, throughput gating, retries, and map-reduce.

pub mod chunking;
pub mod combine;
pub mod retry;
mod service;
pub mod throttle;
pub mod types;

pub use service::{SummaryApi, SummaryService};
pub use types::{
    Chunk, ChunkOutcome, ChunkSummary, ChunkingError, Document, NO_CONTENT_MESSAGE,
    PipelineError, SummaryKind, SummaryOptions, SummaryOutcome,
};
