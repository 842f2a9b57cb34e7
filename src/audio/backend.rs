use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Normalize this frame to the target format (downsample + mono fold).
    pub fn normalized(self, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
        let mut frame = self;

        if frame.sample_rate != target_sample_rate {
            frame = frame.downsampled(target_sample_rate);
        }

        if frame.channels != target_channels && target_channels == 1 {
            frame = frame.to_mono();
        }

        frame
    }

    /// Downsample by decimation: take every Nth sample.
    fn downsampled(self, target_rate: u32) -> AudioFrame {
        if self.sample_rate == target_rate {
            return self;
        }

        let ratio = self.sample_rate / target_rate;
        if ratio <= 1 {
            return self; // Can't upsample
        }

        let downsampled: Vec<i16> = self
            .samples
            .iter()
            .step_by(ratio as usize)
            .copied()
            .collect();

        AudioFrame {
            samples: downsampled,
            sample_rate: target_rate,
            channels: self.channels,
            timestamp_ms: self.timestamp_ms,
        }
    }

    /// Convert stereo to mono by summing channels.
    fn to_mono(self) -> AudioFrame {
        if self.channels == 1 {
            return self;
        }

        if self.channels != 2 {
            return self; // Only support stereo -> mono
        }

        let mut mono_samples = Vec::with_capacity(self.samples.len() / 2);

        // Sum left and right channels (no division to preserve volume)
        for chunk in self.samples.chunks_exact(2) {
            let left = chunk[0] as i32;
            let right = chunk[1] as i32;
            let sum = left + right;
            let mono = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            mono_samples.push(mono);
        }

        AudioFrame {
            samples: mono_samples,
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Configuration for audio backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (frames are normalized to this)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for speech models
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms frames
        }
    }
}

/// Audio capture backend trait
///
/// The latency-sensitive side of capture: implementations push frames into
/// the returned channel and must never block on downstream I/O.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames.
    /// Fails if the audio input cannot be acquired.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Live input device (not available on all platforms)
    Device,
    /// WAV file input (imports, batch processing)
    File(std::path::PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create an audio backend for the requested source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Device => {
                anyhow::bail!("no live input device backend is available on this platform")
            }

            AudioSource::File(path) => {
                let backend = super::source::FileSourceBackend::new(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}
