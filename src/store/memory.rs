use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{ChunkRecord, SessionRecord, Store, TranscriptRecord, TranscriptionStatus};
use crate::session::{SessionHandle, SessionStatus};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    chunks: Vec<ChunkRecord>,
    transcripts: Vec<TranscriptRecord>,
}

/// In-memory store: one mutex over the three collections is the
/// single-writer discipline. Used by tests and as an ephemeral mode.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, handle: &SessionHandle) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.sessions.contains_key(&handle.id) {
            bail!("session {} already exists", handle.id);
        }

        inner.sessions.insert(
            handle.id.clone(),
            SessionRecord {
                id: handle.id.clone(),
                created_at: handle.started_at,
                completed_at: None,
                status: SessionStatus::Recording,
                chunk_count: 0,
            },
        );

        Ok(())
    }

    async fn append_chunk(
        &self,
        session_id: &str,
        chunk_num: u32,
        path: &Path,
        duration_ms: u64,
    ) -> Result<String> {
        let mut inner = self.inner.lock().await;

        let Some(session) = inner.sessions.get_mut(session_id) else {
            bail!("unknown session {session_id}");
        };
        session.chunk_count += 1;

        let chunk_id = format!("chunk-{}", uuid::Uuid::new_v4());
        inner.chunks.push(ChunkRecord {
            id: chunk_id.clone(),
            session_id: session_id.to_string(),
            chunk_num,
            file_path: path.to_string_lossy().into_owned(),
            duration_ms,
            created_at: Utc::now(),
            transcription_status: TranscriptionStatus::Pending,
            attempts: 0,
            not_before: None,
        });

        Ok(chunk_id)
    }

    async fn mark_session_terminal(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        if !status.is_terminal() {
            bail!("{status} is not a terminal status");
        }

        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get_mut(session_id) else {
            bail!("unknown session {session_id}");
        };

        if session.status.is_terminal() {
            bail!("session {session_id} is already terminal");
        }

        session.status = status;
        session.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn claim_next_pending_chunk(&self) -> Result<Option<ChunkRecord>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Oldest pending first, then ascending chunk number; insertion order
        // breaks created_at ties.
        let claimed = inner
            .chunks
            .iter_mut()
            .filter(|c| {
                c.transcription_status == TranscriptionStatus::Pending
                    && c.not_before.map_or(true, |t| t <= now)
            })
            .min_by_key(|c| (c.created_at, c.chunk_num));

        match claimed {
            Some(chunk) => {
                chunk.transcription_status = TranscriptionStatus::InProgress;
                chunk.not_before = None;
                Ok(Some(chunk.clone()))
            }
            None => Ok(None),
        }
    }

    async fn requeue_chunk(&self, chunk_id: &str, not_before: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let chunk = claimed_chunk_mut(&mut inner, chunk_id)?;

        chunk.transcription_status = TranscriptionStatus::Pending;
        chunk.attempts += 1;
        chunk.not_before = Some(not_before);
        Ok(())
    }

    async fn fail_chunk(&self, chunk_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let chunk = claimed_chunk_mut(&mut inner, chunk_id)?;

        chunk.transcription_status = TranscriptionStatus::Failed;
        chunk.attempts += 1;
        chunk.not_before = None;
        Ok(())
    }

    async fn fail_all_pending(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut affected = 0;

        for chunk in inner
            .chunks
            .iter_mut()
            .filter(|c| c.transcription_status == TranscriptionStatus::Pending)
        {
            chunk.transcription_status = TranscriptionStatus::Failed;
            affected += 1;
        }

        Ok(affected)
    }

    async fn record_transcript(&self, chunk_id: &str, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let (session_id, chunk_number) = {
            let chunk = claimed_chunk_mut(&mut inner, chunk_id)?;
            chunk.transcription_status = TranscriptionStatus::Transcribed;
            chunk.not_before = None;
            (chunk.session_id.clone(), chunk.chunk_num)
        };

        inner.transcripts.push(TranscriptRecord {
            id: format!("transcript-{}", uuid::Uuid::new_v4()),
            session_id,
            chunk_number,
            text: text.to_string(),
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.inner.lock().await.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<SessionRecord> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>> {
        let inner = self.inner.lock().await;
        let mut chunks: Vec<ChunkRecord> = inner
            .chunks
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_num);
        Ok(chunks)
    }

    async fn get_ordered_transcript(&self, session_id: &str) -> Result<String> {
        let inner = self.inner.lock().await;
        let mut pieces: Vec<(u32, &str)> = inner
            .transcripts
            .iter()
            .filter(|t| t.session_id == session_id)
            .map(|t| (t.chunk_number, t.text.as_str()))
            .collect();
        pieces.sort_by_key(|(num, _)| *num);

        Ok(pieces
            .iter()
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn claimed_chunk_mut<'a>(inner: &'a mut Inner, chunk_id: &str) -> Result<&'a mut ChunkRecord> {
    let Some(chunk) = inner.chunks.iter_mut().find(|c| c.id == chunk_id) else {
        bail!("unknown chunk {chunk_id}");
    };

    if chunk.transcription_status != TranscriptionStatus::InProgress {
        bail!("chunk {chunk_id} is not claimed");
    }

    Ok(chunk)
}
