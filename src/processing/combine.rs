//! Map-reduce over chunks.
//!
//! Map: every chunk is summarized on its own through the throughput gate and the retry
//! controller. A chunk that still fails becomes an unavailable marker; it never aborts its
//! siblings. Reduce: with more than one chunk, the rendered section summaries (markers
//! included) are synthesized by one more backend call. If that call fails, the joined
//! section summaries are returned under a `Summary of N sections` label.

use super::retry::{RetryPolicy, with_retry};
use super::throttle::ThroughputGate;
use super::types::{Chunk, ChunkSummary, SummaryKind};
use crate::backend::{BackendError, SummaryBackend, prompt};
use crate::metrics::SummaryMetrics;
use futures_util::FutureExt;
use futures_util::stream::{self, StreamExt};

const SECTION_SEPARATOR: &str = "\n\n";

/// Result of running map-reduce over a chunked document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSummary {
    /// Final text.
    pub text: String,
    /// [`SummaryKind::Combined`] or [`SummaryKind::ReduceFallback`].
    pub kind: SummaryKind,
    /// Per-chunk results in chunk order.
    pub sections: Vec<ChunkSummary>,
}

/// Drives backend calls for one pipeline run.
pub struct Combiner<'a> {
    backend: &'a dyn SummaryBackend,
    gate: &'a ThroughputGate,
    retry: RetryPolicy,
    metrics: &'a SummaryMetrics,
    concurrency: usize,
}

impl<'a> Combiner<'a> {
    /// Borrow the long-lived pieces of a service for one run.
    pub fn new(
        backend: &'a dyn SummaryBackend,
        gate: &'a ThroughputGate,
        retry: RetryPolicy,
        metrics: &'a SummaryMetrics,
        concurrency: usize,
    ) -> Self {
        Self {
            backend,
            gate,
            retry,
            metrics,
            concurrency: concurrency.max(1),
        }
    }

    /// Send one prompt through the gate and the retry controller.
    pub async fn call(&self, prompt: &str) -> Result<String, BackendError> {
        with_retry(self.retry, |attempt| async move {
            if attempt > 0 {
                self.metrics.record_rate_limit_retry();
            }
            self.gate.acquire(prompt).await;
            self.backend.generate(prompt).await
        })
        .await
    }

    /// Map then reduce.
    pub async fn combine(&self, chunks: &[Chunk<'_>], topic: Option<&str>) -> CombinedSummary {
        let sections = self.map(chunks, topic).await;
        let (text, kind) = self.reduce(&sections, topic).await;
        CombinedSummary {
            text,
            kind,
            sections,
        }
    }

    /// Summarize every chunk, returning one [`ChunkSummary`] per chunk in chunk order.
    pub async fn map(&self, chunks: &[Chunk<'_>], topic: Option<&str>) -> Vec<ChunkSummary> {
        let total = chunks.len();
        let pending: Vec<_> = chunks
            .iter()
            .map(|chunk| self.summarize_chunk(chunk, total, topic).boxed())
            .collect();
        // `buffered` yields in input order even when calls finish out of order.
        stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn summarize_chunk(
        &self,
        chunk: &Chunk<'_>,
        total: usize,
        topic: Option<&str>,
    ) -> ChunkSummary {
        let number = chunk.index + 1;
        let text = chunk.text.trim();
        tracing::info!(
            chunk = number,
            total,
            chars = text.chars().count(),
            "Summarizing chunk"
        );
        match self.call(&prompt::summary_prompt(text, topic)).await {
            Ok(summary) => {
                tracing::info!(chunk = number, total, "Chunk summarized");
                ChunkSummary::summary(chunk.index, summary)
            }
            Err(error) => {
                tracing::error!(chunk = number, total, error = %error, "Chunk failed after retries");
                ChunkSummary::unavailable(chunk.index, error.to_string())
            }
        }
    }

    /// Reduce section summaries into one text. Never fails.
    pub async fn reduce(
        &self,
        sections: &[ChunkSummary],
        topic: Option<&str>,
    ) -> (String, SummaryKind) {
        let joined = sections
            .iter()
            .map(|section| section.render())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);

        if sections.len() <= 1 {
            return (joined, SummaryKind::Combined);
        }

        tracing::info!(sections = sections.len(), "Combining section summaries");
        match self.call(&prompt::combine_prompt(&joined, topic)).await {
            Ok(summary) => (summary, SummaryKind::Combined),
            Err(error) => {
                tracing::warn!(
                    sections = sections.len(),
                    error = %error,
                    "Reduce step failed; returning section summaries"
                );
                self.metrics.record_reduce_fallback();
                (
                    format!("Summary of {} sections:\n\n{joined}", sections.len()),
                    SummaryKind::ReduceFallback,
                )
            }
        }
    }
}
