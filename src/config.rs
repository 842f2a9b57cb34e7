use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::session::SessionConfig;
use crate::transcribe::WorkerConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_secs: u64,
    pub write_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    /// Path to the speech model; the worker is not started without one
    pub model_path: Option<String>,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl AudioConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_duration: Duration::from_secs(self.chunk_duration_secs),
            sample_rate: self.sample_rate,
            channels: self.channels,
            output_dir: PathBuf::from(&self.recordings_path),
            write_attempts: self.write_attempts,
        }
    }
}

impl TranscriptionConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
