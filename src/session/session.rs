use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionHandle, SessionStateMachine, SessionStatus};
use crate::audio::{AudioBackend, AudioFrame, ChunkBuffer, ChunkWriter, SealedBuffer};
use crate::error::CaptureError;
use crate::store::Store;

/// How a session was asked to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopKind {
    Stop,
    Cancel,
}

/// One chunk's samples en route to disk.
///
/// The session handle is captured by value when the job is created and
/// travels with the samples, so a late-finishing flush can always attribute
/// its result without consulting shared mutable state.
struct FlushJob {
    handle: SessionHandle,
    sealed: SealedBuffer,
}

/// Final accounting for a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub chunk_count: usize,
    pub duration_ms: u64,
}

/// What the capture task observed by the time it finished.
struct CaptureOutcome {
    duration_ms: u64,
    fault: Option<CaptureError>,
}

/// A recording session: audio backend -> chunk buffer -> serial flush lane
/// -> store.
///
/// The capture task drains the backend's frame channel and never touches
/// disk; sealed buffers are handed to a per-session flush lane (a dedicated
/// task fed by an unbounded channel) which owns the chunk counter, writes
/// each file durably, and registers the persistence record. The session
/// becomes terminal only after that lane has fully drained.
pub struct RecordingSession {
    handle: SessionHandle,
    store: Arc<dyn Store>,
    state: Arc<Mutex<SessionStateMachine>>,
    ctrl_tx: watch::Sender<Option<StopKind>>,
    capture_task: Mutex<Option<JoinHandle<CaptureOutcome>>>,
    chunks_flushed: Arc<AtomicUsize>,
    captured_ms: Arc<AtomicU64>,
}

impl RecordingSession {
    /// Acquire the audio input and begin capturing.
    ///
    /// Fails with `PermissionDenied` if the input cannot be acquired, in
    /// which case no session record is created.
    pub async fn start(
        handle: SessionHandle,
        config: SessionConfig,
        store: Arc<dyn Store>,
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<Self, CaptureError> {
        let frames = backend
            .start()
            .await
            .map_err(|e| CaptureError::PermissionDenied(format!("{e:#}")))?;

        store
            .create_session(&handle)
            .await
            .map_err(|e| CaptureError::Capture(format!("failed to register session: {e:#}")))?;

        info!(
            "Recording session {} started ({}Hz, {}ch, {}s chunks)",
            handle.id,
            config.sample_rate,
            config.channels,
            config.chunk_duration.as_secs()
        );

        let (ctrl_tx, ctrl_rx) = watch::channel(None);
        let chunks_flushed = Arc::new(AtomicUsize::new(0));
        let captured_ms = Arc::new(AtomicU64::new(0));
        let state = Arc::new(Mutex::new(SessionStateMachine::new()));

        // Serial flush lane scoped to this session: owns the chunk counter,
        // so no two chunks for the session are ever written concurrently.
        let (flush_tx, flush_rx) = mpsc::unbounded_channel::<FlushJob>();
        let writer = ChunkWriter::new(config.output_dir.clone(), config.write_attempts);
        let lane = tokio::spawn(flush_lane(
            flush_rx,
            writer,
            Arc::clone(&store),
            Arc::clone(&chunks_flushed),
        ));

        let capture_task = tokio::spawn(run_capture(
            handle.clone(),
            config,
            backend,
            frames,
            ctrl_rx,
            flush_tx,
            lane,
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&captured_ms),
        ));

        Ok(Self {
            handle,
            store,
            state,
            ctrl_tx,
            capture_task: Mutex::new(Some(capture_task)),
            chunks_flushed,
            captured_ms,
        })
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Stop recording: flush the partial tail chunk, wait for every flush to
    /// complete durably, then mark the session `complete`.
    pub async fn stop(&self) -> Result<SessionSummary, CaptureError> {
        self.finish(StopKind::Stop).await
    }

    /// Cancel recording: flush what has been captured and mark the session
    /// `cancelled`. Already-flushed chunks are never deleted.
    pub async fn cancel(&self) -> Result<SessionSummary, CaptureError> {
        self.finish(StopKind::Cancel).await
    }

    /// Snapshot of the session as currently known.
    pub async fn summary(&self) -> SessionSummary {
        let status = self.state.lock().await.status();
        SessionSummary {
            session_id: self.handle.id.clone(),
            status,
            chunk_count: self.chunks_flushed.load(Ordering::SeqCst),
            duration_ms: self.captured_ms.load(Ordering::SeqCst),
        }
    }

    async fn finish(&self, kind: StopKind) -> Result<SessionSummary, CaptureError> {
        let task = { self.capture_task.lock().await.take() };

        let Some(task) = task else {
            // Already finished by an earlier stop/cancel or a capture fault
            warn!("Session {} is not recording", self.handle.id);
            return Ok(self.summary().await);
        };

        // Honored by the capture task at the next flush boundary; an
        // in-progress file write always completes first.
        let _ = self.ctrl_tx.send(Some(kind));

        let outcome = task
            .await
            .map_err(|e| CaptureError::Capture(format!("capture task panicked: {e}")))?;

        if let Some(fault) = outcome.fault {
            // The capture task already moved the session to `failed`
            return Err(fault);
        }

        let target = match kind {
            StopKind::Stop => SessionStatus::Complete,
            StopKind::Cancel => SessionStatus::Cancelled,
        };

        {
            let mut sm = self.state.lock().await;
            sm.transition(target)?;
        }

        self.store
            .mark_session_terminal(&self.handle.id, target)
            .await
            .map_err(|e| CaptureError::Capture(format!("failed to finalize session: {e:#}")))?;

        let summary = SessionSummary {
            session_id: self.handle.id.clone(),
            status: target,
            chunk_count: self.chunks_flushed.load(Ordering::SeqCst),
            duration_ms: outcome.duration_ms,
        };

        info!(
            "Session {} {}: {} chunks, {}ms captured",
            summary.session_id, target, summary.chunk_count, summary.duration_ms
        );

        Ok(summary)
    }
}

/// Capture loop: drain frames into the chunk buffer, handing sealed buffers
/// to the flush lane. Never blocks on disk I/O.
#[allow(clippy::too_many_arguments)]
async fn run_capture(
    handle: SessionHandle,
    config: SessionConfig,
    mut backend: Box<dyn AudioBackend>,
    mut frames: mpsc::Receiver<AudioFrame>,
    mut ctrl_rx: watch::Receiver<Option<StopKind>>,
    flush_tx: mpsc::UnboundedSender<FlushJob>,
    lane: JoinHandle<Result<(), CaptureError>>,
    store: Arc<dyn Store>,
    state: Arc<Mutex<SessionStateMachine>>,
    captured_ms: Arc<AtomicU64>,
) -> CaptureOutcome {
    let chunk_ms = config.chunk_duration.as_millis() as u64;
    let mut buffer = ChunkBuffer::new(chunk_ms, config.sample_rate, config.channels);

    'capture: loop {
        tokio::select! {
            res = ctrl_rx.changed() => {
                if res.is_err() || ctrl_rx.borrow().is_some() {
                    break 'capture;
                }
            }
            frame = frames.recv() => match frame {
                Some(frame) => {
                    let frame = frame.normalized(config.sample_rate, config.channels);
                    for sealed in buffer.append(&frame.samples) {
                        let job = FlushJob { handle: handle.clone(), sealed };
                        if flush_tx.send(job).is_err() {
                            // Lane is gone; its error is collected below
                            break 'capture;
                        }
                    }
                    captured_ms.store(buffer.total_captured_ms(), Ordering::SeqCst);
                }
                None => {
                    info!("Audio stream for session {} ended", handle.id);
                    break 'capture;
                }
            }
        }
    }

    if let Err(e) = backend.stop().await {
        warn!("Failed to stop audio backend: {e:#}");
    }

    // Frames the callback side already queued are still captured audio:
    // fold them in before sealing the tail.
    while let Ok(frame) = frames.try_recv() {
        let frame = frame.normalized(config.sample_rate, config.channels);
        for sealed in buffer.append(&frame.samples) {
            let _ = flush_tx.send(FlushJob {
                handle: handle.clone(),
                sealed,
            });
        }
    }

    if let Some(sealed) = buffer.seal_partial() {
        let _ = flush_tx.send(FlushJob {
            handle: handle.clone(),
            sealed,
        });
    }
    captured_ms.store(buffer.total_captured_ms(), Ordering::SeqCst);

    // Close the lane and wait for every queued flush to become durable
    drop(flush_tx);
    let fault = match lane.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(CaptureError::Capture(format!("flush lane panicked: {e}"))),
    };

    if let Some(fault) = &fault {
        error!("Session {} capture fault: {fault}", handle.id);
        let moved = { state.lock().await.transition(SessionStatus::Failed).is_ok() };
        if moved {
            if let Err(e) = store
                .mark_session_terminal(&handle.id, SessionStatus::Failed)
                .await
            {
                error!("Failed to mark session {} failed: {e:#}", handle.id);
            }
        }
    }

    CaptureOutcome {
        duration_ms: buffer.total_captured_ms(),
        fault,
    }
}

/// Per-session serial flush lane.
///
/// Receives sealed buffers in seal order, assigns the gap-free chunk number,
/// writes the file durably, then registers the chunk record. Stops at the
/// first unrecoverable write failure; chunks already written stay on disk
/// and in the store.
async fn flush_lane(
    mut rx: mpsc::UnboundedReceiver<FlushJob>,
    writer: ChunkWriter,
    store: Arc<dyn Store>,
    chunks_flushed: Arc<AtomicUsize>,
) -> Result<(), CaptureError> {
    let mut next_chunk: u32 = 0;

    while let Some(job) = rx.recv().await {
        let chunk_num = next_chunk;
        let duration_ms = job.sealed.duration_ms();

        let path = match writer.write(&job.handle.id, chunk_num, &job.sealed) {
            Ok(path) => path,
            Err(e) => {
                rx.close();
                let mut lost = 1usize; // this job's samples
                while rx.try_recv().is_ok() {
                    lost += 1;
                }
                error!(
                    "Flush lane for session {} aborting; {} chunk(s) could not be written",
                    job.handle.id, lost
                );
                return Err(e);
            }
        };

        if let Err(e) = store
            .append_chunk(&job.handle.id, chunk_num, &path, duration_ms)
            .await
        {
            rx.close();
            return Err(CaptureError::Write {
                attempts: 1,
                reason: format!("chunk record creation failed: {e:#}"),
            });
        }

        next_chunk += 1;
        chunks_flushed.fetch_add(1, Ordering::SeqCst);
    }

    Ok(())
}
