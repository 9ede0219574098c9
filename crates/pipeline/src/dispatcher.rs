//! Transcription dispatcher and worker pool
//!
//! A small fixed pool of OS threads runs the speech-to-text model for every
//! session, keeping inference off the async runtime. Jobs flow through one
//! FIFO channel with an explicit depth cap; results return to the
//! submitting session over a oneshot, never broadcast.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use streamscribe_core::{ErrorKind, RecognitionError, RecognitionOutcome};

use crate::stt::{SttEngine, TranscribeRequest};
use crate::PipelineError;

/// A worker retires after this many consecutive failures.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker threads, each wrapping one use of the engine at a time.
    pub workers: usize,
    /// Jobs queued beyond this are rejected rather than buffered.
    pub max_queue_depth: usize,
    /// Per-job deadline enforced by the awaiting session.
    pub job_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_queue_depth: 32,
            job_timeout: Duration::from_secs(30),
        }
    }
}

struct Job {
    request: TranscribeRequest,
    reply: oneshot::Sender<RecognitionOutcome>,
}

/// Process-wide transcription dispatcher shared by all sessions.
pub struct TranscriptionDispatcher {
    tx: mpsc::Sender<Job>,
    queued: Arc<AtomicUsize>,
    active_workers: Arc<AtomicUsize>,
    max_queue_depth: usize,
    job_timeout: Duration,
    engine_loaded: bool,
}

impl TranscriptionDispatcher {
    /// Spawn the worker pool. The engine is shared by reference; each
    /// worker drives one transcription at a time.
    pub fn new(engine: Arc<dyn SttEngine>, config: DispatcherConfig) -> Self {
        assert!(config.workers > 0, "dispatcher requires at least one worker");

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let queued = Arc::new(AtomicUsize::new(0));
        let active_workers = Arc::new(AtomicUsize::new(config.workers));

        for worker_id in 0..config.workers {
            let rx = Arc::clone(&rx);
            let queued = Arc::clone(&queued);
            let active_workers = Arc::clone(&active_workers);
            let engine = Arc::clone(&engine);

            std::thread::Builder::new()
                .name(format!("stt-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, engine, rx, queued, active_workers))
                .expect("failed to spawn transcription worker");
        }

        Self {
            tx,
            queued,
            active_workers,
            max_queue_depth: config.max_queue_depth,
            job_timeout: config.job_timeout,
            engine_loaded: false,
        }
    }

    /// Record whether the engine is backed by a real model, for health
    /// reporting.
    pub fn with_engine_loaded(mut self, loaded: bool) -> Self {
        self.engine_loaded = loaded;
        self
    }

    /// Submit an utterance for transcription.
    ///
    /// Non-blocking. Returns the receiver the session awaits for this
    /// job's outcome, or `QueueFull` when the backlog cap is reached or no
    /// workers remain.
    pub fn submit(
        &self,
        request: TranscribeRequest,
    ) -> Result<oneshot::Receiver<RecognitionOutcome>, PipelineError> {
        if self.active_workers.load(Ordering::SeqCst) == 0 {
            return Err(PipelineError::QueueFull);
        }

        let admitted = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                if depth >= self.max_queue_depth {
                    None
                } else {
                    Some(depth + 1)
                }
            })
            .is_ok();
        if !admitted {
            return Err(PipelineError::QueueFull);
        }

        let (reply, rx) = oneshot::channel();
        if self.tx.send(Job { request, reply }).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::ChannelClosed);
        }
        Ok(rx)
    }

    /// Await one job's outcome under the given deadline.
    ///
    /// A missed deadline yields `Timeout`; a worker that died mid-job
    /// yields `ModelFailure`. The late result, if any, is discarded.
    pub async fn await_outcome(
        rx: oneshot::Receiver<RecognitionOutcome>,
        deadline: Duration,
    ) -> RecognitionOutcome {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RecognitionError::new(
                ErrorKind::ModelFailure,
                "worker abandoned the job",
            )),
            Err(_) => Err(RecognitionError::new(
                ErrorKind::Timeout,
                format!("transcription exceeded {}s deadline", deadline.as_secs()),
            )),
        }
    }

    /// Per-job deadline configured for this pool.
    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Jobs waiting in the queue (excluding those being processed).
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Workers still serving; below the configured count means degraded.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Whether a real model backs the engine.
    pub fn engine_loaded(&self) -> bool {
        self.engine_loaded
    }
}

fn worker_loop(
    worker_id: usize,
    engine: Arc<dyn SttEngine>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    queued: Arc<AtomicUsize>,
    active_workers: Arc<AtomicUsize>,
) {
    let mut consecutive_failures = 0u32;

    loop {
        // Hold the lock only for the dequeue, not the transcription.
        let job = {
            let guard = rx.lock();
            guard.recv()
        };
        let Ok(job) = job else {
            // Dispatcher dropped; drain complete.
            active_workers.fetch_sub(1, Ordering::SeqCst);
            return;
        };
        queued.fetch_sub(1, Ordering::SeqCst);

        let outcome = match catch_unwind(AssertUnwindSafe(|| engine.transcribe(&job.request))) {
            Ok(Ok(result)) => {
                consecutive_failures = 0;
                Ok(result)
            }
            Ok(Err(err)) => {
                consecutive_failures += 1;
                tracing::error!(worker_id, error = %err, "transcription failed");
                Err(RecognitionError::new(ErrorKind::ModelFailure, err.to_string()))
            }
            Err(_) => {
                consecutive_failures += 1;
                tracing::error!(worker_id, "transcription engine panicked");
                Err(RecognitionError::new(
                    ErrorKind::ModelFailure,
                    "transcription engine panicked",
                ))
            }
        };

        // The session may have gone away; a dead receiver is not an error.
        let _ = job.reply.send(outcome);

        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            let remaining = active_workers.fetch_sub(1, Ordering::SeqCst) - 1;
            tracing::error!(
                worker_id,
                remaining,
                "worker retired after {MAX_CONSECUTIVE_FAILURES} consecutive failures"
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::PlaceholderStt;
    use streamscribe_core::RecognitionResult;

    /// Echoes the request prompt back as the transcription text.
    struct EchoStt;

    impl SttEngine for EchoStt {
        fn transcribe(&self, request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError> {
            Ok(RecognitionResult::new(
                request.prompt.clone().unwrap_or_default(),
            ))
        }
    }

    /// Fails every request.
    struct FailingStt;

    impl SttEngine for FailingStt {
        fn transcribe(&self, _request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError> {
            Err(PipelineError::Stt("model exploded".to_string()))
        }
    }

    /// Signals when a job starts, then blocks until released.
    struct BlockingStt {
        started: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl SttEngine for BlockingStt {
        fn transcribe(&self, _request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError> {
            let _ = self.started.send(());
            let _ = self.release.lock().recv();
            Ok(RecognitionResult::new("done"))
        }
    }

    fn request(prompt: &str) -> TranscribeRequest {
        TranscribeRequest {
            samples: vec![0.0; 512],
            language: None,
            prompt: Some(prompt.to_string()),
        }
    }

    #[tokio::test]
    async fn test_results_deliver_in_submission_order() {
        let dispatcher =
            TranscriptionDispatcher::new(Arc::new(EchoStt), DispatcherConfig::default());

        let receivers: Vec<_> = (0..5)
            .map(|i| dispatcher.submit(request(&format!("job-{i}"))).unwrap())
            .collect();

        for (i, rx) in receivers.into_iter().enumerate() {
            let outcome =
                TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;
            assert_eq!(outcome.unwrap().text, format!("job-{i}"));
        }
    }

    #[tokio::test]
    async fn test_overload_rejects_above_depth_cap() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(BlockingStt {
            started: started_tx,
            release: Mutex::new(release_rx),
        });

        let dispatcher = TranscriptionDispatcher::new(
            engine,
            DispatcherConfig {
                workers: 1,
                max_queue_depth: 2,
                job_timeout: Duration::from_secs(5),
            },
        );

        // First job occupies the worker...
        let first = dispatcher.submit(request("a")).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // ...two more fill the queue...
        let second = dispatcher.submit(request("b")).unwrap();
        let third = dispatcher.submit(request("c")).unwrap();
        // ...and the next is rejected, leaving the session usable.
        assert!(matches!(
            dispatcher.submit(request("d")),
            Err(PipelineError::QueueFull)
        ));

        // Release everything and confirm the accepted jobs still finish.
        for _ in 0..3 {
            release_tx.send(()).unwrap();
        }
        for rx in [first, second, third] {
            let outcome =
                TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;
            assert_eq!(outcome.unwrap().text, "done");
        }
        assert_eq!(dispatcher.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_error() {
        let (started_tx, _started_rx) = mpsc::channel();
        let (_release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(BlockingStt {
            started: started_tx,
            release: Mutex::new(release_rx),
        });

        let dispatcher = TranscriptionDispatcher::new(engine, DispatcherConfig::default());
        let rx = dispatcher.submit(request("slow")).unwrap();

        let outcome =
            TranscriptionDispatcher::await_outcome(rx, Duration::from_millis(50)).await;
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_engine_error_is_model_failure() {
        let dispatcher =
            TranscriptionDispatcher::new(Arc::new(FailingStt), DispatcherConfig::default());

        let rx = dispatcher.submit(request("x")).unwrap();
        let outcome = TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;

        let err = outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModelFailure);
        assert!(err.message.contains("model exploded"));
    }

    #[tokio::test]
    async fn test_worker_retires_after_consecutive_failures() {
        let dispatcher = TranscriptionDispatcher::new(
            Arc::new(FailingStt),
            DispatcherConfig {
                workers: 1,
                max_queue_depth: 8,
                job_timeout: Duration::from_secs(5),
            },
        );
        assert_eq!(dispatcher.active_workers(), 1);

        for _ in 0..3 {
            let rx = dispatcher.submit(request("boom")).unwrap();
            let outcome =
                TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;
            assert!(outcome.is_err());
        }

        // Give the retiring thread a moment to update the gauge.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatcher.active_workers(), 0);
        assert!(matches!(
            dispatcher.submit(request("after")),
            Err(PipelineError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        /// Fails when the prompt says so.
        struct FlakyStt;
        impl SttEngine for FlakyStt {
            fn transcribe(
                &self,
                request: &TranscribeRequest,
            ) -> Result<RecognitionResult, PipelineError> {
                match request.prompt.as_deref() {
                    Some("fail") => Err(PipelineError::Stt("flaky".to_string())),
                    other => Ok(RecognitionResult::new(other.unwrap_or_default())),
                }
            }
        }

        let dispatcher = TranscriptionDispatcher::new(
            Arc::new(FlakyStt),
            DispatcherConfig {
                workers: 1,
                max_queue_depth: 16,
                job_timeout: Duration::from_secs(5),
            },
        );

        // Two failures, a success, then two more failures: no retirement.
        for prompt in ["fail", "fail", "ok", "fail", "fail"] {
            let rx = dispatcher.submit(request(prompt)).unwrap();
            let _ = TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;
        }
        assert_eq!(dispatcher.active_workers(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_engine_round_trip() {
        let dispatcher = TranscriptionDispatcher::new(
            Arc::new(PlaceholderStt::with_response("canned")),
            DispatcherConfig::default(),
        );

        let rx = dispatcher.submit(request("ignored")).unwrap();
        let outcome = TranscriptionDispatcher::await_outcome(rx, Duration::from_secs(5)).await;
        assert_eq!(outcome.unwrap().text, "canned");
    }
}
