// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool for running extractions concurrently.
//
// Extraction is CPU-bound and blocking, so each job runs on tokio's blocking
// thread pool. A semaphore caps how many run at once and an optional timeout
// bounds each document.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lektor_core::config::PoolConfig;
use lektor_core::error::LektorError;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::orchestrator::{ExtractionReport, ExtractionRequest, Extractor};

/// Outcome of one request submitted through [`ExtractionPool::extract_all`].
#[derive(Debug)]
pub struct PoolResult {
    /// Position of the request in the submitted batch.
    pub index: usize,
    pub label: String,
    pub outcome: Result<ExtractionReport, LektorError>,
    /// Wall time including any wait for a permit.
    pub wall_time: Duration,
}

/// Running totals since the pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Result<ExtractionReport, LektorError>) {
        let counter = match outcome {
            Ok(_) => &self.completed,
            Err(LektorError::Timeout(_)) => &self.timed_out,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Runs extractions on a bounded number of blocking workers.
#[derive(Clone)]
pub struct ExtractionPool {
    extractor: Arc<Extractor>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Option<Duration>,
    counters: Arc<Counters>,
}

impl ExtractionPool {
    pub fn new(extractor: Arc<Extractor>, config: &PoolConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            extractor,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout: config.timeout_secs.map(Duration::from_secs),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Override the per-document timeout. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Run one request, waiting for a free worker first.
    ///
    /// On timeout the caller gets [`LektorError::Timeout`]; the blocking job
    /// is detached, keeps its worker slot until it finishes, and its output
    /// is discarded.
    pub async fn extract(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionReport, LektorError> {
        let outcome = Self::run_one(
            self.extractor.clone(),
            self.permits.clone(),
            self.timeout,
            request,
        )
        .await;
        self.counters.record(&outcome);
        outcome
    }

    /// Run a batch. Results arrive in completion order, each tagged with the
    /// index of its request.
    pub fn extract_all(&self, requests: Vec<ExtractionRequest>) -> mpsc::Receiver<PoolResult> {
        let (tx, rx) = mpsc::channel(requests.len().max(1));
        info!(
            documents = requests.len(),
            max_concurrent = self.max_concurrent,
            "Starting batch extraction"
        );

        for (index, request) in requests.into_iter().enumerate() {
            let tx = tx.clone();
            let extractor = self.extractor.clone();
            let permits = self.permits.clone();
            let counters = self.counters.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                let started = Instant::now();
                let label = request.source.label();
                let outcome = Self::run_one(extractor, permits, timeout, request).await;
                counters.record(&outcome);

                let result = PoolResult {
                    index,
                    label,
                    outcome,
                    wall_time: started.elapsed(),
                };
                if tx.send(result).await.is_err() {
                    debug!(index, "Batch receiver dropped; discarding result");
                }
            });
        }

        rx
    }

    async fn run_one(
        extractor: Arc<Extractor>,
        permits: Arc<Semaphore>,
        timeout: Option<Duration>,
        request: ExtractionRequest,
    ) -> Result<ExtractionReport, LektorError> {
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| LektorError::Input("extraction pool is closed".to_string()))?;

        // The permit lives as long as the blocking job, even after a timeout
        // has detached it.
        let label = request.source.label();
        let job = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            extractor.run(&request)
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(file = label.as_str(), ?limit, "Extraction timed out");
                    return Err(LektorError::Timeout(limit));
                }
            },
            None => job.await,
        };

        joined.map_err(|err| {
            LektorError::Recognition(format!("extraction worker for {label} failed: {err}"))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    use image::{GrayImage, ImageFormat, Luma};
    use lektor_core::config::ExtractionConfig;
    use lektor_core::{RecognitionLanguage, WordToken};
    use lektor_document::{RecognitionBackend, UnavailableBackend};

    struct SlowBackend(Duration);

    impl RecognitionBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn recognize(
            &self,
            _image: &GrayImage,
            _language: &RecognitionLanguage,
        ) -> Result<Vec<WordToken>, LektorError> {
            std::thread::sleep(self.0);
            Ok(vec![WordToken::new("done", 90.0)])
        }
    }

    /// Records the highest number of recognitions running at once.
    struct GaugedBackend {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugedBackend {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl RecognitionBackend for GaugedBackend {
        fn name(&self) -> &'static str {
            "gauged"
        }

        fn recognize(
            &self,
            _image: &GrayImage,
            _language: &RecognitionLanguage,
        ) -> Result<Vec<WordToken>, LektorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![WordToken::new("done", 90.0)])
        }
    }

    fn png_page() -> Vec<u8> {
        let page = GrayImage::from_pixel(32, 32, Luma([240u8]));
        let mut bytes = Vec::new();
        page.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn pool(backend: Arc<dyn RecognitionBackend>, config: PoolConfig) -> ExtractionPool {
        let extractor = Extractor::new(ExtractionConfig::default(), backend);
        ExtractionPool::new(Arc::new(extractor), &config)
    }

    #[tokio::test]
    async fn batch_results_carry_their_index() {
        let pool = pool(
            Arc::new(SlowBackend(Duration::from_millis(5))),
            PoolConfig {
                max_concurrent: 2,
                timeout_secs: None,
            },
        );
        let requests = vec![
            ExtractionRequest::for_bytes("a.png", png_page()),
            ExtractionRequest::for_bytes("b.docx", Vec::new()),
            ExtractionRequest::for_bytes("c.png", png_page()),
        ];

        let mut rx = pool.extract_all(requests);
        let mut seen = HashSet::new();
        while let Some(result) = rx.recv().await {
            let report = result.outcome.expect("extraction succeeds");
            match result.index {
                1 => assert_eq!(report.result.text, "Unsupported file type"),
                _ => assert_eq!(report.result.text, "done"),
            }
            seen.insert(result.index);
        }
        assert_eq!(seen, HashSet::from([0, 1, 2]));
        assert_eq!(pool.stats().completed, 3);
    }

    #[tokio::test]
    async fn slow_document_times_out() {
        let pool = pool(
            Arc::new(SlowBackend(Duration::from_millis(500))),
            PoolConfig::default(),
        )
        .with_timeout(Some(Duration::from_millis(20)));

        let err = pool
            .extract(ExtractionRequest::for_bytes("slow.png", png_page()))
            .await
            .expect_err("times out");
        assert!(matches!(err, LektorError::Timeout(_)));
        assert_eq!(pool.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn timed_out_jobs_keep_their_worker_slot() {
        let backend = Arc::new(GaugedBackend::new(Duration::from_millis(120)));
        let pool = pool(
            backend.clone(),
            PoolConfig {
                max_concurrent: 1,
                timeout_secs: None,
            },
        )
        .with_timeout(Some(Duration::from_millis(20)));

        let requests = (0..4)
            .map(|i| ExtractionRequest::for_bytes(format!("page{i}.png"), png_page()))
            .collect();
        let mut rx = pool.extract_all(requests);
        let mut received = 0;
        while let Some(result) = rx.recv().await {
            assert!(matches!(result.outcome, Err(LektorError::Timeout(_))));
            received += 1;
        }

        assert_eq!(received, 4);
        assert_eq!(pool.stats().timed_out, 4);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn input_errors_are_counted_as_failures() {
        let pool = pool(Arc::new(UnavailableBackend), PoolConfig::default());
        let outcome = pool
            .extract(ExtractionRequest::for_path("/nonexistent/scan.png"))
            .await;
        assert!(matches!(outcome, Err(LektorError::Input(_))));
        assert_eq!(
            pool.stats(),
            PoolStats {
                completed: 0,
                failed: 1,
                timed_out: 0,
            }
        );
    }

    #[test]
    fn zero_workers_is_raised_to_one() {
        let pool = pool(
            Arc::new(UnavailableBackend),
            PoolConfig {
                max_concurrent: 0,
                timeout_secs: Some(5),
            },
        );
        assert_eq!(pool.max_concurrent(), 1);
    }
}
