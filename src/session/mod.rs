pub mod config;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use session::{RecordingSession, SessionSummary};
pub use state::{SessionHandle, SessionStateMachine, SessionStatus};
