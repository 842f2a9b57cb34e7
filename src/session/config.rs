use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a recording session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Duration of each audio chunk before rotating files
    pub chunk_duration: Duration,

    /// Sample rate for captured audio (speech models expect 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Root directory for chunk files
    pub output_dir: PathBuf,

    /// Bounded retry count for chunk file writes
    pub write_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(32),
            sample_rate: 16000,
            channels: 1,
            output_dir: PathBuf::from("audio"),
            write_attempts: 3,
        }
    }
}
