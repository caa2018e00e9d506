//! Summarization service coordinating chunking, the throughput gate, and map-reduce.

use crate::{
    backend::{SummaryBackend, build_backend, prompt},
    config::{BackendConfig, ConfigError, PipelineConfig},
    metrics::{MetricsSnapshot, SummaryMetrics},
    processing::{
        chunking,
        combine::Combiner,
        retry::RetryPolicy,
        throttle::ThroughputGate,
        types::{
            Document, NO_CONTENT_MESSAGE, PipelineError, SummaryKind, SummaryOptions,
            SummaryOutcome,
        },
    },
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Runs the summarization pipeline against one backend.
///
/// The service owns the backend handle, the throughput gate, and the metrics registry so
/// that every request (HTTP or CLI) draws from the same rate-limit budget. Construct it once
/// near process start and share it through an `Arc`.
pub struct SummaryService {
    backend: Arc<dyn SummaryBackend>,
    gate: Arc<ThroughputGate>,
    pipeline: PipelineConfig,
    chunk_size: usize,
    metrics: Arc<SummaryMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait SummaryApi: Send + Sync {
    /// Summarize a document of arbitrary length.
    async fn summarize(
        &self,
        document: Document,
        options: SummaryOptions,
    ) -> Result<SummaryOutcome, PipelineError>;

    /// Model identifier reported with every summary.
    fn model(&self) -> &str;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SummaryService {
    /// Build the backend selected by `backend` and wrap it in a service.
    pub fn new(backend: &BackendConfig, pipeline: PipelineConfig) -> Result<Self, ConfigError> {
        let adapter = build_backend(backend)?;
        Ok(Self::with_backend(adapter, backend, pipeline))
    }

    /// Wrap an already constructed backend.
    pub fn with_backend(
        backend: Arc<dyn SummaryBackend>,
        config: &BackendConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        let gate = ThroughputGate::new(config.throughput, config.max_output_tokens);
        Self::with_gate(backend, Arc::new(gate), config.chunk_size, pipeline)
    }

    /// Wrap a backend with an explicit gate and default chunk size.
    pub fn with_gate(
        backend: Arc<dyn SummaryBackend>,
        gate: Arc<ThroughputGate>,
        chunk_size: usize,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            gate,
            pipeline,
            chunk_size,
            metrics: Arc::new(SummaryMetrics::new()),
        }
    }

    /// Default chunk size, in characters, used when a request does not override it.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Summarize `document`, honoring the configured deadline.
    pub async fn generate_summary(
        &self,
        document: &Document,
        options: SummaryOptions,
    ) -> Result<SummaryOutcome, PipelineError> {
        match self.pipeline.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(document, options))
                .await
                .map_err(|_| {
                    tracing::warn!(timeout_secs = limit.as_secs(), "Summarization timed out");
                    PipelineError::TimedOut(limit)
                })?,
            None => self.run(document, options).await,
        }
    }

    /// Like [`Self::generate_summary`], abandoning the run as soon as `cancel` resolves.
    ///
    /// In-flight backend calls and pending backoff sleeps are dropped with the run.
    pub async fn generate_summary_until<C>(
        &self,
        document: &Document,
        options: SummaryOptions,
        cancel: C,
    ) -> Result<SummaryOutcome, PipelineError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.generate_summary(document, options) => result,
            () = cancel => {
                tracing::warn!("Summarization cancelled by caller");
                Err(PipelineError::Cancelled)
            }
        }
    }

    async fn run(
        &self,
        document: &Document,
        options: SummaryOptions,
    ) -> Result<SummaryOutcome, PipelineError> {
        if document.is_blank() {
            tracing::info!("Document is blank; nothing to summarize");
            return Ok(self.outcome(NO_CONTENT_MESSAGE.into(), SummaryKind::NoContent, 0, 0));
        }

        let chunk_size = options.chunk_size.unwrap_or(self.chunk_size);
        let topic = document.topic();
        let combiner = Combiner::new(
            self.backend.as_ref(),
            &self.gate,
            RetryPolicy::from(&self.pipeline),
            &self.metrics,
            self.pipeline.max_concurrent_chunks,
        );

        let chars = document.text.chars().count();
        if chunk_size > 0 && chars <= chunk_size {
            tracing::info!(
                chars,
                chunk_size,
                model = self.backend.model(),
                "Summarizing document in a single pass"
            );
            let text = document.text.trim();
            let summary = combiner
                .call(&prompt::summary_prompt(text, topic))
                .await
                .inspect_err(|error| {
                    tracing::error!(error = %error, "Single-pass summarization failed");
                })?;
            self.metrics.record_document(0, 0);
            return Ok(self.outcome(summary, SummaryKind::SinglePass, 0, 0));
        }

        let chunks = chunking::non_blank(chunking::split(
            &document.text,
            chunk_size,
            self.pipeline.chunk_overlap,
        )?);
        tracing::info!(
            chars,
            chunk_size,
            overlap = self.pipeline.chunk_overlap,
            chunks = chunks.len(),
            model = self.backend.model(),
            "Summarizing document in chunks"
        );
        let combined = combiner.combine(&chunks, topic).await;
        let unavailable = combined
            .sections
            .iter()
            .filter(|section| section.is_unavailable())
            .count();
        self.metrics
            .record_document(chunks.len() as u64, unavailable as u64);
        tracing::info!(
            chunks = chunks.len(),
            unavailable,
            kind = ?combined.kind,
            "Summary complete"
        );
        Ok(self.outcome(combined.text, combined.kind, chunks.len(), unavailable))
    }

    fn outcome(
        &self,
        summary: String,
        kind: SummaryKind,
        chunk_count: usize,
        unavailable_chunks: usize,
    ) -> SummaryOutcome {
        SummaryOutcome {
            summary,
            model: self.backend.model().to_string(),
            kind,
            chunk_count,
            unavailable_chunks,
        }
    }
}

#[async_trait]
impl SummaryApi for SummaryService {
    async fn summarize(
        &self,
        document: Document,
        options: SummaryOptions,
    ) -> Result<SummaryOutcome, PipelineError> {
        self.generate_summary(&document, options).await
    }

    fn model(&self) -> &str {
        self.backend.model()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::config::BackendProvider;
    use crate::processing::types::ChunkingError;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockBackend {
        prompts: Mutex<Vec<String>>,
        fail_all: bool,
        fail_reduce: bool,
        rate_limit_first: Mutex<u32>,
        stall: bool,
    }

    impl MockBackend {
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SummaryBackend for MockBackend {
        fn provider(&self) -> BackendProvider {
            BackendProvider::Groq
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
            let call = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            {
                let mut remaining = self.rate_limit_first.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BackendError::RateLimited {
                        status: Some(429),
                        message: "Rate limit reached for model".into(),
                    });
                }
            }
            if self.fail_all {
                return Err(BackendError::Unavailable("connection refused".into()));
            }
            if prompt.contains("Section Summaries") {
                return if self.fail_reduce {
                    Err(BackendError::Response("empty completion".into()))
                } else {
                    Ok("Final synthesis.".into())
                };
            }
            Ok(format!("Part {call}"))
        }
    }

    fn service(
        backend: Arc<MockBackend>,
        chunk_size: usize,
        pipeline: PipelineConfig,
    ) -> SummaryService {
        SummaryService::with_gate(
            backend,
            Arc::new(ThroughputGate::unlimited()),
            chunk_size,
            pipeline,
        )
    }

    #[tokio::test]
    async fn blank_document_returns_sentinel_without_calls() {
        let backend = Arc::new(MockBackend::default());
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        for text in ["", "  \n\t "] {
            let outcome = service
                .generate_summary(&Document::new(text, None), SummaryOptions::default())
                .await
                .unwrap();
            assert_eq!(outcome.summary, NO_CONTENT_MESSAGE);
            assert_eq!(outcome.kind, SummaryKind::NoContent);
            assert_eq!(outcome.model, "mock-model");
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn short_document_is_summarized_in_one_call() {
        let backend = Arc::new(MockBackend::default());
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let outcome = service
            .generate_summary(
                &Document::new("A brief lecture on tides.", Some("Oceanography".into())),
                SummaryOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.kind, SummaryKind::SinglePass);
        assert_eq!(outcome.summary, "Part 1");
        assert_eq!(backend.calls(), 1);
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("Topic: Oceanography"));
        assert!(prompts[0].contains("A brief lecture on tides."));
    }

    #[tokio::test]
    async fn long_document_uses_three_map_calls_and_one_reduce() {
        let backend = Arc::new(MockBackend::default());
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let outcome = service
            .generate_summary(&Document::new("a".repeat(20_000), None), SummaryOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.kind, SummaryKind::Combined);
        assert_eq!(outcome.chunk_count, 3);
        assert_eq!(outcome.summary, "Final synthesis.");
        assert_eq!(backend.calls(), 4);

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_summarized, 1);
        assert_eq!(snapshot.chunks_summarized, 3);
    }

    #[tokio::test]
    async fn chunk_size_override_changes_the_split() {
        let backend = Arc::new(MockBackend::default());
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let outcome = service
            .generate_summary(
                &Document::new("b".repeat(5_000), None),
                SummaryOptions {
                    chunk_size: Some(3_000),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_a_chunking_error() {
        let backend = Arc::new(MockBackend::default());
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let error = service
            .generate_summary(
                &Document::new("text", None),
                SummaryOptions {
                    chunk_size: Some(0),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Chunking(ChunkingError::InvalidChunkSize)
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn reduce_failure_is_labeled_not_raised() {
        let backend = Arc::new(MockBackend {
            fail_reduce: true,
            ..Default::default()
        });
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let outcome = service
            .generate_summary(&Document::new("a".repeat(20_000), None), SummaryOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.kind, SummaryKind::ReduceFallback);
        assert_eq!(
            outcome.summary,
            "Summary of 3 sections:\n\nPart 1\n\nPart 2\n\nPart 3"
        );
    }

    #[tokio::test]
    async fn padding_between_sentences_is_not_a_failed_section() {
        let backend = Arc::new(MockBackend {
            fail_reduce: true,
            ..Default::default()
        });
        let service = service(backend.clone(), 3_000, PipelineConfig::default());
        let text = format!("Intro sentence. {}Final words here.", " ".repeat(10_000));

        let outcome = service
            .generate_summary(&Document::new(text, None), SummaryOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(outcome.unavailable_chunks, 0);
        assert_eq!(outcome.summary, "Summary of 2 sections:\n\nPart 1\n\nPart 2");
        assert_eq!(backend.calls(), 3);
        assert_eq!(service.metrics_snapshot().chunks_unavailable, 0);
    }

    #[tokio::test]
    async fn every_chunk_failing_still_yields_markers() {
        let backend = Arc::new(MockBackend {
            fail_all: true,
            ..Default::default()
        });
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let outcome = service
            .generate_summary(&Document::new("a".repeat(20_000), None), SummaryOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.unavailable_chunks, 3);
        assert!(outcome.summary.starts_with("Summary of 3 sections:"));
        let marker = regex::Regex::new(r"\[Chunk (\d+) summary unavailable: [^\]]+\]").unwrap();
        let numbers: Vec<&str> = marker
            .captures_iter(&outcome.summary)
            .map(|captures| captures.get(1).unwrap().as_str())
            .collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);
        assert!(outcome.summary.contains(
            "[Chunk 2 summary unavailable: Backend unavailable: connection refused]"
        ));
        assert_eq!(service.metrics_snapshot().chunks_unavailable, 3);
    }

    #[tokio::test]
    async fn single_pass_failure_propagates() {
        let backend = Arc::new(MockBackend {
            fail_all: true,
            ..Default::default()
        });
        let service = service(backend, 8_000, PipelineConfig::default());

        let error = service
            .generate_summary(&Document::new("short", None), SummaryOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Backend(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_single_pass_is_retried() {
        let backend = Arc::new(MockBackend {
            rate_limit_first: Mutex::new(2),
            ..Default::default()
        });
        let service = service(backend.clone(), 8_000, PipelineConfig::default());
        let started = tokio::time::Instant::now();

        let outcome = service
            .generate_summary(&Document::new("short", None), SummaryOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.summary, "Part 3");
        assert_eq!(backend.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(service.metrics_snapshot().rate_limit_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_future_aborts_the_run() {
        let backend = Arc::new(MockBackend {
            stall: true,
            ..Default::default()
        });
        let service = service(backend.clone(), 8_000, PipelineConfig::default());

        let error = service
            .generate_summary_until(
                &Document::new("short", None),
                SummaryOptions::default(),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::Cancelled));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_bounds_the_run() {
        let backend = Arc::new(MockBackend {
            stall: true,
            ..Default::default()
        });
        let pipeline = PipelineConfig {
            timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let service = service(backend, 8_000, pipeline);

        let error = service
            .generate_summary(&Document::new("short", None), SummaryOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::TimedOut(limit) if limit == Duration::from_secs(30)));
    }
}
