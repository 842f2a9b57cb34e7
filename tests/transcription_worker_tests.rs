// Integration tests for the transcription worker: claim protocol, retry
// state machine, exclusive inference, and ordered transcript assembly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use voxnote::test_support::MockEngine;
use voxnote::{
    ChunkWriter, MemoryStore, SealedBuffer, SessionHandle, SessionStatus, Store,
    TranscriptionStatus, TranscriptionWorker, WorkerConfig,
};

/// Seed a completed session with `n` chunks backed by real WAV files.
async fn seed_session(store: &MemoryStore, dir: &Path, session_id: &str, n: u32) -> Result<()> {
    store
        .create_session(&SessionHandle::with_id(session_id))
        .await?;

    let writer = ChunkWriter::new(dir, 3);
    for num in 0..n {
        let sealed = SealedBuffer {
            samples: vec![0i16; 1600],
            start_sample: (num as u64) * 1600,
            sample_rate: 16000,
            channels: 1,
        };
        let path = writer.write(session_id, num, &sealed).expect("chunk write");
        store.append_chunk(session_id, num, &path, 100).await?;
    }

    store
        .mark_session_terminal(session_id, SessionStatus::Complete)
        .await?;
    Ok(())
}

fn worker_config(backoff_ms: u64) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(10),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(backoff_ms),
    }
}

/// Wait until every chunk of the session reaches a terminal transcription
/// status, or panic after a few seconds.
async fn wait_until_settled(store: &MemoryStore, session_id: &str) {
    for _ in 0..500 {
        let chunks = store.list_chunks(session_id).await.unwrap();
        let settled = chunks.iter().all(|c| {
            matches!(
                c.transcription_status,
                TranscriptionStatus::Transcribed | TranscriptionStatus::Failed
            )
        });
        if settled {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("chunks of {session_id} never settled");
}

#[tokio::test]
async fn transcribes_chunks_in_ascending_order() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    seed_session(&store, temp.path(), "s1", 3).await?;

    let engine = MockEngine::with_script(vec![
        Ok("alpha".into()),
        Ok("bravo".into()),
        Ok("charlie".into()),
    ]);

    let worker = TranscriptionWorker::new(store.clone(), Box::new(engine), worker_config(50));
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;
    handle.shutdown().await?;

    // Claims happened in ascending chunk order, so the scripted texts landed
    // on chunks 0, 1, 2 respectively
    assert_eq!(store.get_ordered_transcript("s1").await?, "alpha bravo charlie");

    let chunks = store.list_chunks("s1").await?;
    for chunk in &chunks {
        assert_eq!(chunk.transcription_status, TranscriptionStatus::Transcribed);
        assert_eq!(chunk.attempts, 0);
    }

    Ok(())
}

#[tokio::test]
async fn failing_chunk_retries_without_blocking_others() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    seed_session(&store, temp.path(), "s1", 3).await?;

    // Claim order: chunk 0 succeeds; chunk 1 fails and is backed off; chunk 2
    // proceeds; chunk 1 fails once more, then succeeds on its third attempt.
    let engine = MockEngine::with_script(vec![
        Ok("zero".into()),
        Err("inference exploded".into()),
        Ok("two".into()),
        Err("inference exploded".into()),
        Ok("one".into()),
    ]);

    let worker = TranscriptionWorker::new(store.clone(), Box::new(engine), worker_config(100));
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;
    handle.shutdown().await?;

    let chunks = store.list_chunks("s1").await?;
    assert_eq!(chunks[0].transcription_status, TranscriptionStatus::Transcribed);
    assert_eq!(chunks[0].attempts, 0);
    assert_eq!(chunks[1].transcription_status, TranscriptionStatus::Transcribed);
    assert_eq!(chunks[1].attempts, 2, "two failed attempts recorded");
    assert_eq!(chunks[2].transcription_status, TranscriptionStatus::Transcribed);
    assert_eq!(chunks[2].attempts, 0);

    // Chunk 1 finished last, but concatenation follows chunk order
    assert_eq!(store.get_ordered_transcript("s1").await?, "zero one two");

    Ok(())
}

#[tokio::test]
async fn chunk_fails_permanently_after_bounded_attempts() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    seed_session(&store, temp.path(), "s1", 1).await?;

    let engine = MockEngine::with_script(vec![
        Err("boom".into()),
        Err("boom".into()),
        Err("boom".into()),
    ]);

    let worker = TranscriptionWorker::new(store.clone(), Box::new(engine), worker_config(20));
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;
    handle.shutdown().await?;

    let chunks = store.list_chunks("s1").await?;
    assert_eq!(chunks[0].transcription_status, TranscriptionStatus::Failed);
    assert_eq!(chunks[0].attempts, 3);
    assert_eq!(store.get_ordered_transcript("s1").await?, "");

    Ok(())
}

#[tokio::test]
async fn at_most_one_inference_executes_at_a_time() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    seed_session(&store, temp.path(), "s1", 5).await?;

    let engine = MockEngine::new().with_delay(Duration::from_millis(30));
    let max_observed = engine.max_observed();

    let worker = TranscriptionWorker::new(store.clone(), Box::new(engine), worker_config(20));
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;

    assert!(handle.inference_in_flight() <= 1);
    handle.shutdown().await?;

    assert_eq!(
        max_observed.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "inference concurrency never exceeds one"
    );

    Ok(())
}

#[tokio::test]
async fn model_load_failure_fails_pending_work_without_crashing() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());
    seed_session(&store, temp.path(), "s1", 3).await?;

    let worker = TranscriptionWorker::new(
        store.clone(),
        Box::new(MockEngine::failing_load()),
        worker_config(20),
    );
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;

    let chunks = store.list_chunks("s1").await?;
    for chunk in &chunks {
        assert_eq!(chunk.transcription_status, TranscriptionStatus::Failed);
    }

    // The loop survived the load failure and still honors shutdown
    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unreadable_chunk_file_counts_as_failed_attempt() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::new());

    store.create_session(&SessionHandle::with_id("s1")).await?;
    store
        .append_chunk(
            "s1",
            0,
            temp.path().join("missing.wav").as_path(),
            1000,
        )
        .await?;

    let worker = TranscriptionWorker::new(
        store.clone(),
        Box::new(MockEngine::new()),
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(10),
        },
    );
    let handle = worker.start();

    wait_until_settled(&store, "s1").await;
    handle.shutdown().await?;

    let chunks = store.list_chunks("s1").await?;
    assert_eq!(chunks[0].transcription_status, TranscriptionStatus::Failed);
    assert_eq!(chunks[0].attempts, 1);

    Ok(())
}
