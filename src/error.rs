use thiserror::Error;

use crate::session::SessionStatus;

/// Errors raised on the capture path.
///
/// These are local to the affected session: other sessions and the
/// transcription worker are never impacted by them.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The audio input could not be acquired. Fatal: no session is created.
    #[error("audio input unavailable: {0}")]
    PermissionDenied(String),

    /// An unrecoverable fault in the capture stream. The session transitions
    /// to `failed`; chunks flushed so far are preserved.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A chunk could not be durably written after bounded retries.
    #[error("chunk write failed after {attempts} attempts: {reason}")]
    Write { attempts: u32, reason: String },

    /// Session lifecycle violation: status transitions are one-directional.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// Errors raised on the transcription path.
///
/// Worker-path failures are local to the affected chunk; they never block
/// capture or other chunks.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The speech-to-text model could not be loaded.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// A single inference attempt failed. Subject to bounded retry.
    #[error("inference failed: {0}")]
    Inference(String),
}
