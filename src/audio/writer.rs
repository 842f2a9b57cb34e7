use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::buffer::SealedBuffer;
use crate::error::CaptureError;

/// Deterministic chunk file path: `{root}/{date}/session_{id}_chunk_{num}.wav`
pub fn chunk_path(
    root: &Path,
    created_at: DateTime<Utc>,
    session_id: &str,
    chunk_num: u32,
) -> PathBuf {
    root.join(created_at.format("%Y-%m-%d").to_string())
        .join(format!("session_{}_chunk_{:03}.wav", session_id, chunk_num))
}

/// Durably encodes sealed buffers to WAV files.
///
/// The file is fully written and fsynced before the caller registers the
/// persistence record, so a record never references a missing or partial
/// file. Failed writes are retried a bounded number of times; the samples
/// stay in the sealed buffer until a write succeeds or retries are exhausted.
pub struct ChunkWriter {
    output_dir: PathBuf,
    write_attempts: u32,
}

impl ChunkWriter {
    pub fn new(output_dir: impl Into<PathBuf>, write_attempts: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_attempts: write_attempts.max(1),
        }
    }

    /// Write one chunk's samples and return the file path.
    pub fn write(
        &self,
        session_id: &str,
        chunk_num: u32,
        sealed: &SealedBuffer,
    ) -> Result<PathBuf, CaptureError> {
        let path = chunk_path(&self.output_dir, Utc::now(), session_id, chunk_num);

        let mut last_err = None;
        for attempt in 1..=self.write_attempts {
            match write_wav(&path, sealed) {
                Ok(()) => {
                    info!(
                        "Chunk {} of session {} written: {} ({}ms, {} samples)",
                        chunk_num,
                        session_id,
                        path.display(),
                        sealed.duration_ms(),
                        sealed.samples.len()
                    );
                    return Ok(path);
                }
                Err(e) => {
                    warn!(
                        "Write attempt {}/{} for chunk {} of session {} failed: {:#}",
                        attempt, self.write_attempts, chunk_num, session_id, e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(CaptureError::Write {
            attempts: self.write_attempts,
            reason: last_err
                .map(|e| format!("{e:#}"))
                .unwrap_or_else(|| "no attempt recorded".to_string()),
        })
    }
}

fn write_wav(path: &Path, sealed: &SealedBuffer) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create chunk directory {:?}", parent))?;
    }

    let spec = hound::WavSpec {
        channels: sealed.channels,
        sample_rate: sealed.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    for &sample in &sealed.samples {
        writer
            .write_sample(sample)
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    // fsync before the persistence record is created
    File::open(path)
        .and_then(|f| f.sync_all())
        .with_context(|| format!("Failed to sync chunk file {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sealed(samples: Vec<i16>) -> SealedBuffer {
        SealedBuffer {
            samples,
            start_sample: 0,
            sample_rate: 16_000,
            channels: 1,
        }
    }

    #[test]
    fn writes_readable_wav_with_all_samples() {
        let dir = TempDir::new().unwrap();
        let writer = ChunkWriter::new(dir.path(), 3);

        let path = writer.write("s1", 0, &sealed(vec![42i16; 1600])).unwrap();
        assert!(path.exists());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn path_encodes_session_date_and_chunk_number() {
        let dir = TempDir::new().unwrap();
        let created = Utc::now();
        let path = chunk_path(dir.path(), created, "abc", 7);

        let s = path.to_string_lossy();
        assert!(s.contains(&created.format("%Y-%m-%d").to_string()));
        assert!(s.ends_with("session_abc_chunk_007.wav"));
    }

    #[test]
    fn exhausted_retries_surface_write_failure() {
        // A directory path that cannot be created (parent is a file)
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let writer = ChunkWriter::new(&blocker, 2);
        let err = writer.write("s1", 0, &sealed(vec![1i16; 16])).unwrap_err();

        match err {
            CaptureError::Write { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected Write error, got {other:?}"),
        }
    }
}
