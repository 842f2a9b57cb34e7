pub mod backend;
pub mod buffer;
pub mod file;
pub mod source;
pub mod writer;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use buffer::{ChunkBuffer, SealedBuffer};
pub use file::AudioFile;
pub use source::FileSourceBackend;
pub use writer::{chunk_path, ChunkWriter};
