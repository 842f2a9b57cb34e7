use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::file::AudioFile;

/// Audio backend that streams a WAV file as a live frame sequence.
///
/// Used for imports and batch processing. Frames are paced by channel
/// backpressure rather than wall-clock time, so a file streams as fast as
/// the capture pipeline can drain it.
pub struct FileSourceBackend {
    config: AudioBackendConfig,
    path: PathBuf,
    file: Option<AudioFile>,
    task: Option<JoinHandle<()>>,
    capturing: Arc<AtomicBool>,
}

impl FileSourceBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Result<Self> {
        // Load up-front so an unreadable source fails before a session exists
        let file = AudioFile::open(&path)?;

        info!(
            "File source backend initialized: {} ({:.1}s)",
            path.display(),
            file.duration_seconds
        );

        Ok(Self {
            config,
            path,
            file: Some(file),
            task: None,
            capturing: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileSourceBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let file = match self.file.take() {
            Some(f) => f,
            None => bail!("File source already consumed"),
        };

        let (tx, rx) = mpsc::channel(32);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let target_rate = self.config.target_sample_rate;
        let target_channels = self.config.target_channels;
        let samples_per_frame = (file.sample_rate as usize
            * self.config.buffer_duration_ms as usize
            / 1000)
            * file.channels as usize;

        let task = tokio::spawn(async move {
            let mut position = 0usize;

            for slice in file.samples.chunks(samples_per_frame.max(1)) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let timestamp_ms = (position as u64 / file.channels as u64) * 1000
                    / file.sample_rate as u64;
                position += slice.len();

                let frame = AudioFrame {
                    samples: slice.to_vec(),
                    sample_rate: file.sample_rate,
                    channels: file.channels,
                    timestamp_ms,
                }
                .normalized(target_rate, target_channels);

                if tx.send(frame).await.is_err() {
                    break; // receiver dropped
                }
            }

            capturing.store(false, Ordering::SeqCst);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        info!("File source backend stopped: {}", self.path.display());
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
