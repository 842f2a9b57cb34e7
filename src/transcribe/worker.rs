use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::engine::TranscriptionEngine;
use crate::audio::AudioFile;
use crate::error::TranscribeError;
use crate::store::{ChunkRecord, Store};

/// Configuration for the transcription worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to idle between polls when no work is pending
    pub poll_interval: Duration,

    /// Bounded retry count per chunk (total attempts, including the first)
    pub max_attempts: u32,

    /// Backoff before a failed chunk may be claimed again
    pub retry_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// The consumer half of the pipeline: drains pending chunks into
/// transcripts, independently of capture.
///
/// One long-lived cooperative loop; the engine mutex guarantees at most one
/// inference executes at any time. Failures are local to the affected chunk
/// and never block capture or other chunks.
pub struct TranscriptionWorker {
    store: Arc<dyn Store>,
    engine: Arc<Mutex<Box<dyn TranscriptionEngine>>>,
    config: WorkerConfig,
    in_flight: Arc<AtomicUsize>,
}

impl TranscriptionWorker {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Box<dyn TranscriptionEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine: Arc::new(Mutex::new(engine)),
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn the worker loop. Returns a handle used to observe and shut it
    /// down.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight = Arc::clone(&self.in_flight);

        let task = tokio::spawn(self.run(shutdown_rx));

        WorkerHandle {
            shutdown_tx,
            task,
            in_flight,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Transcription worker started");

        loop {
            // Shutdown is honored between chunks, never mid-inference
            if *shutdown.borrow() {
                break;
            }

            match self.store.claim_next_pending_chunk().await {
                Ok(Some(chunk)) => self.process(chunk).await,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!("Failed to poll for pending chunks: {e:#}");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Transcription worker stopped");
    }

    async fn process(&self, chunk: ChunkRecord) {
        if let Err(e) = self.ensure_loaded().await {
            error!("Transcription model unavailable: {e}");

            if let Err(e) = self.store.fail_chunk(&chunk.id).await {
                error!("Failed to mark chunk {} failed: {e:#}", chunk.id);
            }
            match self.store.fail_all_pending().await {
                Ok(n) if n > 0 => {
                    warn!("Marked {n} pending chunk(s) failed after model load failure")
                }
                Ok(_) => {}
                Err(e) => error!("Failed to fail pending chunks: {e:#}"),
            }
            return;
        }

        match self.transcribe_chunk(&chunk).await {
            Ok(text) => {
                if let Err(e) = self.store.record_transcript(&chunk.id, &text).await {
                    error!(
                        "Failed to record transcript for chunk {} of session {}: {e:#}",
                        chunk.chunk_num, chunk.session_id
                    );
                } else {
                    info!(
                        "Chunk {} of session {} transcribed ({} chars)",
                        chunk.chunk_num,
                        chunk.session_id,
                        text.len()
                    );
                }
            }
            Err(e) => {
                let attempts = chunk.attempts + 1;

                if attempts < self.config.max_attempts {
                    let not_before = Utc::now()
                        + chrono::Duration::from_std(self.config.retry_backoff)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    warn!(
                        "Chunk {} of session {} failed (attempt {}/{}): {e}; requeued",
                        chunk.chunk_num, chunk.session_id, attempts, self.config.max_attempts
                    );
                    if let Err(e) = self.store.requeue_chunk(&chunk.id, not_before).await {
                        error!("Failed to requeue chunk {}: {e:#}", chunk.id);
                    }
                } else {
                    error!(
                        "Chunk {} of session {} failed permanently after {} attempts: {e}",
                        chunk.chunk_num, chunk.session_id, attempts
                    );
                    if let Err(e) = self.store.fail_chunk(&chunk.id).await {
                        error!("Failed to mark chunk {} failed: {e:#}", chunk.id);
                    }
                }
            }
        }
    }

    /// Load the model if it is not resident yet.
    async fn ensure_loaded(&self) -> Result<(), TranscribeError> {
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || {
            let mut engine = engine.blocking_lock();
            if engine.is_loaded() {
                Ok(())
            } else {
                engine.load()
            }
        })
        .await
        .map_err(|e| TranscribeError::ModelLoad(format!("load task panicked: {e}")))?
    }

    /// Read the chunk file and run one inference on it.
    async fn transcribe_chunk(&self, chunk: &ChunkRecord) -> Result<String, TranscribeError> {
        let engine = Arc::clone(&self.engine);
        let in_flight = Arc::clone(&self.in_flight);
        let path = chunk.file_path.clone();

        tokio::task::spawn_blocking(move || {
            let audio = AudioFile::open(&path)
                .map_err(|e| TranscribeError::Inference(format!("{e:#}")))?;
            let samples = audio.to_f32();

            let engine = engine.blocking_lock();
            in_flight.fetch_add(1, Ordering::SeqCst);
            let result = engine.transcribe(&samples);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
        .await
        .map_err(|e| TranscribeError::Inference(format!("inference task panicked: {e}")))?
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerHandle {
    /// Number of inferences currently executing. Never exceeds 1.
    pub fn inference_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait for the loop to exit. An in-progress chunk
    /// is finished first.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.task.await.context("worker task panicked")?;
        Ok(())
    }
}
