use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::state::AppState;
use crate::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource};
use crate::error::CaptureError;
use crate::session::{RecordingSession, SessionHandle};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate one)
    pub session_id: Option<String>,

    /// WAV file to capture from instead of a live input device
    pub source_path: Option<String>,

    /// Chunk duration in seconds (default from service config)
    pub chunk_duration_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub transcript: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Recording control
// ============================================================================

/// POST /sessions/start
/// Start a new recording session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let handle = match req.session_id {
        Some(id) => SessionHandle::with_id(id),
        None => SessionHandle::generate(),
    };

    info!("Starting recording session: {}", handle.id);

    // Check if already recording
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&handle.id) {
            return error_response(
                StatusCode::CONFLICT,
                format!("Session {} is already recording", handle.id),
            );
        }
    }

    let mut config = state.session_config.clone();
    if let Some(secs) = req.chunk_duration_secs {
        config.chunk_duration = Duration::from_secs(secs);
    }

    let source = match req.source_path {
        Some(path) => AudioSource::File(PathBuf::from(path)),
        None => AudioSource::Device,
    };

    let backend_config = AudioBackendConfig {
        target_sample_rate: config.sample_rate,
        target_channels: config.channels,
        ..AudioBackendConfig::default()
    };

    let backend = match AudioBackendFactory::create(source, backend_config) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to acquire audio input: {e:#}");
            return error_response(
                StatusCode::FORBIDDEN,
                format!("Failed to acquire audio input: {e:#}"),
            );
        }
    };

    let session =
        match RecordingSession::start(handle.clone(), config, Arc::clone(&state.store), backend)
            .await
        {
            Ok(s) => Arc::new(s),
            Err(e @ CaptureError::PermissionDenied(_)) => {
                error!("Failed to start session: {e}");
                return error_response(StatusCode::FORBIDDEN, e.to_string());
            }
            Err(e) => {
                error!("Failed to start session: {e}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(handle.id.clone(), session);
    }

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: handle.id,
            status: "recording".to_string(),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/stop
/// Stop recording; the session completes once its final flush is durable
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    finish_session(state, session_id, false).await
}

/// POST /sessions/:session_id/cancel
/// Cancel recording; chunks flushed so far are preserved
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    finish_session(state, session_id, true).await
}

async fn finish_session(
    state: AppState,
    session_id: String,
    cancel: bool,
) -> axum::response::Response {
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(session) = session else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Session {session_id} not found"),
        );
    };

    let result = if cancel {
        session.cancel().await
    } else {
        session.stop().await
    };

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!("Failed to finish session {session_id}: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// Collaborator read surface
// ============================================================================

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_sessions().await {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(e) => {
            error!("Failed to list sessions: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&session_id).await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Session {session_id} not found"),
        ),
        Err(e) => {
            error!("Failed to load session {session_id}: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// GET /sessions/:session_id/chunks
pub async fn get_session_chunks(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.list_chunks(&session_id).await {
        Ok(chunks) => (StatusCode::OK, Json(chunks)).into_response(),
        Err(e) => {
            error!("Failed to list chunks for {session_id}: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// GET /sessions/:session_id/transcript
/// Full transcript in chunk order, regardless of transcription completion
/// order
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Session {session_id} not found"),
            )
        }
        Err(e) => {
            error!("Failed to load session {session_id}: {e:#}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"));
        }
    }

    match state.store.get_ordered_transcript(&session_id).await {
        Ok(transcript) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                session_id,
                transcript,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load transcript for {session_id}: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
