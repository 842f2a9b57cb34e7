// Integration tests for the capture pipeline: backend -> chunk buffer ->
// flush lane -> store.
//
// These tests drive frames through a channel-fed backend and verify chunk
// boundaries, durability ordering, and session lifecycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use voxnote::test_support::{ChannelBackend, DeniedBackend};
use voxnote::{
    AudioFrame, CaptureError, MemoryStore, RecordingSession, SessionConfig, SessionHandle,
    SessionStatus, Store,
};

fn config(dir: &Path, chunk_secs: u64) -> SessionConfig {
    SessionConfig {
        chunk_duration: Duration::from_secs(chunk_secs),
        sample_rate: 16000,
        channels: 1,
        output_dir: dir.to_path_buf(),
        write_attempts: 3,
    }
}

/// A frame of silence. 16kHz mono: 16 samples per millisecond.
fn frame(duration_ms: u64, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![0i16; (duration_ms * 16) as usize],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
    }
}

#[tokio::test]
async fn seventy_second_recording_yields_three_exact_chunks() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    let (tx, backend) = ChannelBackend::pair(64);

    let session = RecordingSession::start(
        SessionHandle::with_id("rec-70s"),
        config(temp.path(), 32),
        store.clone(),
        Box::new(backend),
    )
    .await?;

    // 70 seconds of audio in 100ms frames
    for i in 0..700 {
        tx.send(frame(100, i * 100)).await?;
    }

    let summary = session.stop().await?;

    assert_eq!(summary.status, SessionStatus::Complete);
    assert_eq!(summary.chunk_count, 3);
    assert_eq!(summary.duration_ms, 70_000);

    let chunks = store.list_chunks("rec-70s").await?;
    let durations: Vec<u64> = chunks.iter().map(|c| c.duration_ms).collect();
    assert_eq!(durations, vec![32_000, 32_000, 6_000]);

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_num, i as u32);
        assert!(
            Path::new(&chunk.file_path).exists(),
            "chunk {} file should exist",
            chunk.chunk_num
        );
    }

    // The session became terminal only after every chunk record existed
    let record = store.get_session("rec-70s").await?.expect("session record");
    assert_eq!(record.status, SessionStatus::Complete);
    assert_eq!(record.chunk_count, 3);
    let completed_at = record.completed_at.expect("completed_at set");
    for chunk in &chunks {
        assert!(chunk.created_at <= completed_at);
    }

    Ok(())
}

#[tokio::test]
async fn cancel_after_five_seconds_preserves_partial_chunk() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    let (tx, backend) = ChannelBackend::pair(64);

    let session = RecordingSession::start(
        SessionHandle::with_id("rec-cancel"),
        config(temp.path(), 32),
        store.clone(),
        Box::new(backend),
    )
    .await?;

    for i in 0..50 {
        tx.send(frame(100, i * 100)).await?;
    }

    let summary = session.cancel().await?;

    assert_eq!(summary.status, SessionStatus::Cancelled);
    assert_eq!(summary.chunk_count, 1);
    assert_eq!(summary.duration_ms, 5_000);

    let chunks = store.list_chunks("rec-cancel").await?;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].duration_ms, 5_000);
    assert!(
        Path::new(&chunks[0].file_path).exists(),
        "cancel never deletes flushed chunks"
    );

    let record = store.get_session("rec-cancel").await?.expect("session record");
    assert_eq!(record.status, SessionStatus::Cancelled);

    Ok(())
}

#[tokio::test]
async fn chunk_numbers_are_gapless_for_odd_frame_sizes() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    let (tx, backend) = ChannelBackend::pair(64);

    let session = RecordingSession::start(
        SessionHandle::with_id("rec-odd"),
        config(temp.path(), 1),
        store.clone(),
        Box::new(backend),
    )
    .await?;

    // 333ms frames straddle the 1s chunk boundary
    for i in 0..10 {
        tx.send(frame(333, i * 333)).await?;
    }

    let summary = session.stop().await?;

    // 3330ms with 1s chunks: three full chunks plus a 330ms tail
    assert_eq!(summary.chunk_count, 4);

    let chunks = store.list_chunks("rec-odd").await?;
    let numbers: Vec<u32> = chunks.iter().map(|c| c.chunk_num).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3]);

    let total: u64 = chunks.iter().map(|c| c.duration_ms).sum();
    assert_eq!(total, 3_330);
    assert_eq!(chunks[3].duration_ms, 330);

    Ok(())
}

#[tokio::test]
async fn denied_input_creates_no_session() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let result = RecordingSession::start(
        SessionHandle::with_id("rec-denied"),
        config(temp.path(), 32),
        store.clone(),
        Box::new(DeniedBackend),
    )
    .await;

    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert!(store.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn second_stop_reports_state_without_error() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    let (tx, backend) = ChannelBackend::pair(16);

    let session = RecordingSession::start(
        SessionHandle::with_id("rec-twice"),
        config(temp.path(), 32),
        store.clone(),
        Box::new(backend),
    )
    .await?;

    tx.send(frame(100, 0)).await?;

    let first = session.stop().await?;
    assert_eq!(first.status, SessionStatus::Complete);

    let second = session.stop().await?;
    assert_eq!(second.status, SessionStatus::Complete);
    assert_eq!(second.chunk_count, first.chunk_count);

    Ok(())
}

#[tokio::test]
async fn unwritable_output_fails_session_but_keeps_it_queryable() -> Result<()> {
    let temp = TempDir::new()?;

    // Output "directory" is a file, so every chunk write fails
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, b"x")?;

    let store = Arc::new(MemoryStore::new());
    let (tx, backend) = ChannelBackend::pair(64);

    let session = RecordingSession::start(
        SessionHandle::with_id("rec-baddisk"),
        config(&blocker, 1),
        store.clone(),
        Box::new(backend),
    )
    .await?;

    for i in 0..30 {
        // The flush lane dies on the first chunk; later sends may find the
        // capture task already gone
        if tx.send(frame(100, i * 100)).await.is_err() {
            break;
        }
    }

    let result = session.stop().await;
    assert!(matches!(result, Err(CaptureError::Write { .. })));

    let record = store.get_session("rec-baddisk").await?.expect("session record");
    assert_eq!(record.status, SessionStatus::Failed);

    Ok(())
}
