//! Mock implementations for testing without real audio devices or models.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use crate::audio::{AudioBackend, AudioFrame};
use crate::error::TranscribeError;
use crate::transcribe::TranscriptionEngine;

/// Scripted transcription engine.
///
/// Pops one outcome per inference from the front of the script; once the
/// script is exhausted every inference succeeds with the default text. Also
/// tracks the highest number of concurrent inferences it has ever observed.
pub struct MockEngine {
    loaded: AtomicBool,
    fail_load: bool,
    script: Mutex<VecDeque<Result<String, String>>>,
    default_text: String,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_observed: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            fail_load: false,
            script: Mutex::new(VecDeque::new()),
            default_text: "lorem ipsum".to_string(),
            delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_observed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Engine whose inferences follow the given script, front to back.
    /// `Err` entries produce inference failures.
    pub fn with_script(outcomes: Vec<Result<String, String>>) -> Self {
        let mut engine = Self::new();
        engine.script = Mutex::new(outcomes.into());
        engine
    }

    /// Engine whose model load always fails.
    pub fn failing_load() -> Self {
        let mut engine = Self::new();
        engine.fail_load = true;
        engine
    }

    /// Make each inference take at least this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of concurrent inferences ever observed. Shareable
    /// before the engine is boxed.
    pub fn max_observed(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_observed)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionEngine for MockEngine {
    fn load(&mut self) -> Result<(), TranscribeError> {
        if self.fail_load {
            return Err(TranscribeError::ModelLoad("scripted load failure".into()));
        }

        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn transcribe(&self, _samples: &[f32]) -> Result<String, TranscribeError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.pop_front()
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(TranscribeError::Inference(msg)),
            None => Ok(self.default_text.clone()),
        }
    }
}

/// Audio backend fed by an external channel.
///
/// Tests construct a `(sender, backend)` pair, hand the backend to a
/// `RecordingSession`, and drive frames through the sender.
pub struct ChannelBackend {
    rx: Option<mpsc::Receiver<AudioFrame>>,
    capturing: AtomicBool,
}

impl ChannelBackend {
    pub fn pair(buffer: usize) -> (mpsc::Sender<AudioFrame>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                rx: Some(rx),
                capturing: AtomicBool::new(false),
            },
        )
    }
}

#[async_trait::async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let Some(rx) = self.rx.take() else {
            bail!("Already started");
        };

        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Backend whose input can never be acquired.
pub struct DeniedBackend;

#[async_trait::async_trait]
impl AudioBackend for DeniedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        bail!("microphone access denied")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}
