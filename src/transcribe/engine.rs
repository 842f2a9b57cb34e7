use crate::error::TranscribeError;

/// Speech-to-text engine abstraction.
///
/// The model is a shared, exclusive, expensive resource: the worker keeps
/// the engine behind a mutex and runs at most one inference at a time.
pub trait TranscriptionEngine: Send + Sync {
    /// Load the model and keep it resident. Called lazily, once.
    fn load(&mut self) -> Result<(), TranscribeError>;

    /// Check if the model is loaded and ready.
    fn is_loaded(&self) -> bool;

    /// Transcribe 16kHz mono samples in [-1.0, 1.0] to text.
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError>;
}
