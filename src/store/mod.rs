pub mod memory;
pub mod sqlite;

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionHandle, SessionStatus};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Transcription lifecycle of a chunk: `pending -> in_progress ->
/// {transcribed|failed}`, with `failed` attempts requeued to `pending` up to
/// a bounded retry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    InProgress,
    Transcribed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionStatus::Pending => "pending",
            TranscriptionStatus::InProgress => "in_progress",
            TranscriptionStatus::Transcribed => "transcribed",
            TranscriptionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TranscriptionStatus::Pending),
            "in_progress" => Some(TranscriptionStatus::InProgress),
            "transcribed" => Some(TranscriptionStatus::Transcribed),
            "failed" => Some(TranscriptionStatus::Failed),
            _ => None,
        }
    }
}

/// One recording attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub chunk_count: u32,
}

/// One durably-written audio segment of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub session_id: String,
    pub chunk_num: u32,
    pub file_path: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub transcription_status: TranscriptionStatus,
    /// Failed transcription attempts so far
    pub attempts: u32,
    /// Earliest time a requeued chunk may be claimed again
    pub not_before: Option<DateTime<Utc>>,
}

/// The text produced for one chunk. Append-only; the core never edits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: String,
    pub session_id: String,
    pub chunk_number: u32,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Durable record of sessions, chunks, and transcripts; the single source of
/// truth between the capture pipeline and the transcription worker.
///
/// Implementations serialize all writes internally (single-writer
/// discipline); reads may proceed concurrently against a consistent
/// snapshot. Callers reason only about each operation's atomicity, never
/// about threading.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Register a new session in `recording` status.
    async fn create_session(&self, handle: &SessionHandle) -> Result<()>;

    /// Register a durably-written chunk and bump the session's chunk count.
    /// Returns the new chunk's id. The chunk starts `pending`.
    async fn append_chunk(
        &self,
        session_id: &str,
        chunk_num: u32,
        path: &Path,
        duration_ms: u64,
    ) -> Result<String>;

    /// Move a session from `recording` to a terminal status, stamping
    /// `completed_at`. Fails if the session is already terminal.
    async fn mark_session_terminal(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    /// Atomically claim the next `pending` chunk, flipping it to
    /// `in_progress`. Claims honor backoff stamps and are ordered
    /// oldest-first, then by ascending chunk number, so a session's chunks
    /// are processed chronologically.
    async fn claim_next_pending_chunk(&self) -> Result<Option<ChunkRecord>>;

    /// Return a claimed chunk to `pending` after a failed attempt,
    /// incrementing its attempt count and stamping the backoff deadline.
    async fn requeue_chunk(&self, chunk_id: &str, not_before: DateTime<Utc>) -> Result<()>;

    /// Permanently fail a claimed chunk after exhausting retries.
    async fn fail_chunk(&self, chunk_id: &str) -> Result<()>;

    /// Mark every currently `pending` chunk as `failed` (model load
    /// failure). Returns how many chunks were affected.
    async fn fail_all_pending(&self) -> Result<u64>;

    /// Write the transcript for a claimed chunk and mark it `transcribed`.
    async fn record_transcript(&self, chunk_id: &str, text: &str) -> Result<()>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// A session's chunks in ascending chunk number order.
    async fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>>;

    /// The session's full transcript: every chunk's text concatenated in
    /// ascending chunk number order, regardless of transcription completion
    /// order.
    async fn get_ordered_transcript(&self, session_id: &str) -> Result<String>;
}
