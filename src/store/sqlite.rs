use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{ChunkRecord, SessionRecord, Store, TranscriptionStatus};
use crate::session::{SessionHandle, SessionStatus};

/// SQLite-backed store.
///
/// The pool is capped at a single connection: every writer (capture
/// pipeline, worker) funnels through it, which is the store's single-writer
/// discipline. SQLite reads from the same connection see a consistent
/// snapshot.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {:?}", path))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database ready at {}", path.display());

        Ok(Self { pool })
    }
}

fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).context("timestamp out of range")
}

fn session_from_row(row: &SqliteRow) -> Result<SessionRecord> {
    let status: String = row.try_get("status")?;

    Ok(SessionRecord {
        id: row.try_get("id")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")?
            .map(from_millis)
            .transpose()?,
        status: SessionStatus::parse(&status)
            .with_context(|| format!("unknown session status {status:?}"))?,
        chunk_count: row.try_get::<i64, _>("chunk_count")? as u32,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord> {
    let status: String = row.try_get("transcription_status")?;

    Ok(ChunkRecord {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        chunk_num: row.try_get::<i64, _>("chunk_num")? as u32,
        file_path: row.try_get("file_path")?,
        duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
        created_at: from_millis(row.try_get("created_at")?)?,
        transcription_status: TranscriptionStatus::parse(&status)
            .with_context(|| format!("unknown transcription status {status:?}"))?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        not_before: row
            .try_get::<Option<i64>, _>("not_before")?
            .map(from_millis)
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn create_session(&self, handle: &SessionHandle) -> Result<()> {
        sqlx::query("INSERT INTO sessions (id, created_at, status) VALUES (?, ?, 'recording')")
            .bind(&handle.id)
            .bind(millis(handle.started_at))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create session {}", handle.id))?;

        Ok(())
    }

    async fn append_chunk(
        &self,
        session_id: &str,
        chunk_num: u32,
        path: &Path,
        duration_ms: u64,
    ) -> Result<String> {
        let chunk_id = format!("chunk-{}", uuid::Uuid::new_v4());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chunks (id, session_id, chunk_num, file_path, duration_ms, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk_id)
        .bind(session_id)
        .bind(chunk_num as i64)
        .bind(path.to_string_lossy().into_owned())
        .bind(duration_ms as i64)
        .bind(millis(Utc::now()))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert chunk {chunk_num} of {session_id}"))?;

        let updated = sqlx::query("UPDATE sessions SET chunk_count = chunk_count + 1 WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() != 1 {
            bail!("unknown session {session_id}");
        }

        tx.commit().await?;
        Ok(chunk_id)
    }

    async fn mark_session_terminal(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        if !status.is_terminal() {
            bail!("{status} is not a terminal status");
        }

        let updated = sqlx::query(
            "UPDATE sessions SET status = ?, completed_at = ? \
             WHERE id = ? AND status = 'recording'",
        )
        .bind(status.as_str())
        .bind(millis(Utc::now()))
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() != 1 {
            bail!("session {session_id} is missing or already terminal");
        }

        Ok(())
    }

    async fn claim_next_pending_chunk(&self) -> Result<Option<ChunkRecord>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM chunks \
             WHERE transcription_status = 'pending' \
               AND (not_before IS NULL OR not_before <= ?) \
             ORDER BY created_at ASC, chunk_num ASC \
             LIMIT 1",
        )
        .bind(millis(Utc::now()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut chunk = chunk_from_row(&row)?;

        let updated = sqlx::query(
            "UPDATE chunks SET transcription_status = 'in_progress', not_before = NULL \
             WHERE id = ? AND transcription_status = 'pending'",
        )
        .bind(&chunk.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;

        chunk.transcription_status = TranscriptionStatus::InProgress;
        chunk.not_before = None;
        Ok(Some(chunk))
    }

    async fn requeue_chunk(&self, chunk_id: &str, not_before: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE chunks SET transcription_status = 'pending', \
                               attempts = attempts + 1, \
                               not_before = ? \
             WHERE id = ? AND transcription_status = 'in_progress'",
        )
        .bind(millis(not_before))
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() != 1 {
            bail!("chunk {chunk_id} is not claimed");
        }

        Ok(())
    }

    async fn fail_chunk(&self, chunk_id: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE chunks SET transcription_status = 'failed', \
                               attempts = attempts + 1, \
                               not_before = NULL \
             WHERE id = ? AND transcription_status = 'in_progress'",
        )
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() != 1 {
            bail!("chunk {chunk_id} is not claimed");
        }

        Ok(())
    }

    async fn fail_all_pending(&self) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE chunks SET transcription_status = 'failed' \
             WHERE transcription_status = 'pending'",
        )
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected())
    }

    async fn record_transcript(&self, chunk_id: &str, text: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT session_id, chunk_num FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            bail!("unknown chunk {chunk_id}");
        };
        let session_id: String = row.try_get("session_id")?;
        let chunk_num: i64 = row.try_get("chunk_num")?;

        let updated = sqlx::query(
            "UPDATE chunks SET transcription_status = 'transcribed', not_before = NULL \
             WHERE id = ? AND transcription_status = 'in_progress'",
        )
        .bind(chunk_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            bail!("chunk {chunk_id} is not claimed");
        }

        sqlx::query(
            "INSERT INTO transcripts (id, session_id, chunk_number, text, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(format!("transcript-{}", uuid::Uuid::new_v4()))
        .bind(&session_id)
        .bind(chunk_num)
        .bind(text)
        .bind(millis(Utc::now()))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert transcript for chunk {chunk_num} of {session_id}"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE session_id = ? ORDER BY chunk_num ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn get_ordered_transcript(&self, session_id: &str) -> Result<String> {
        let rows = sqlx::query(
            "SELECT text FROM transcripts WHERE session_id = ? ORDER BY chunk_number ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let pieces: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("text"))
            .collect::<Result<_, _>>()?;

        Ok(pieces.join(" "))
    }
}
