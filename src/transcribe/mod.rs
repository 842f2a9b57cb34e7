pub mod engine;
pub mod worker;

#[cfg(feature = "whisper")]
pub mod whisper;

pub use engine::TranscriptionEngine;
pub use worker::{TranscriptionWorker, WorkerConfig, WorkerHandle};

#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;
