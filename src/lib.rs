pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod test_support;
pub mod transcribe;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    ChunkBuffer, ChunkWriter, FileSourceBackend, SealedBuffer,
};
pub use config::Config;
pub use error::{CaptureError, TranscribeError};
pub use http::{create_router, AppState};
pub use session::{
    RecordingSession, SessionConfig, SessionHandle, SessionStateMachine, SessionStatus,
    SessionSummary,
};
pub use store::{
    ChunkRecord, MemoryStore, SessionRecord, SqliteStore, Store, TranscriptRecord,
    TranscriptionStatus,
};
pub use transcribe::{TranscriptionEngine, TranscriptionWorker, WorkerConfig, WorkerHandle};
