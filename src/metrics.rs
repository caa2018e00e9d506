use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct SummaryMetrics {
    documents_summarized: AtomicU64,
    chunks_summarized: AtomicU64,
    chunks_unavailable: AtomicU64,
    reduce_fallbacks: AtomicU64,
    rate_limit_retries: AtomicU64,
}

impl SummaryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished document and how many chunks it was split into.
    pub fn record_document(&self, chunk_count: u64, unavailable: u64) {
        self.documents_summarized.fetch_add(1, Ordering::Relaxed);
        self.chunks_summarized
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.chunks_unavailable
            .fetch_add(unavailable, Ordering::Relaxed);
    }

    /// Record a reduce step that fell back to the joined section summaries.
    pub fn record_reduce_fallback(&self) {
        self.reduce_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one backoff-and-retry after a rate-limit rejection.
    pub fn record_rate_limit_retry(&self) {
        self.rate_limit_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_summarized: self.documents_summarized.load(Ordering::Relaxed),
            chunks_summarized: self.chunks_summarized.load(Ordering::Relaxed),
            chunks_unavailable: self.chunks_unavailable.load(Ordering::Relaxed),
            reduce_fallbacks: self.reduce_fallbacks.load(Ordering::Relaxed),
            rate_limit_retries: self.rate_limit_retries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of summarization counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents summarized since startup.
    pub documents_summarized: u64,
    /// Total chunks produced across all summarized documents.
    pub chunks_summarized: u64,
    /// Chunks whose summary ended as an unavailable marker.
    pub chunks_unavailable: u64,
    /// Reduce steps that degraded to the joined section summaries.
    pub reduce_fallbacks: u64,
    /// Retries issued after rate-limit rejections.
    pub rate_limit_retries: u64,
}
