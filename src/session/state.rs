use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Lifecycle status of a recording session.
///
/// `Recording` is the only non-terminal status; transitions are monotonic
/// and one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Recording,
    Complete,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Recording)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Recording => "recording",
            SessionStatus::Complete => "complete",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recording" => Some(SessionStatus::Recording),
            "complete" => Some(SessionStatus::Complete),
            "cancelled" => Some(SessionStatus::Cancelled),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of a session, captured at creation time.
///
/// Every asynchronous unit of work (flush job, transcription claim) carries
/// a clone of this value instead of reading a shared mutable "current
/// session" reference, so late-finishing work can always attribute its
/// result.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

impl SessionHandle {
    /// Generate a fresh handle with a random id.
    pub fn generate() -> Self {
        Self::with_id(format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
        }
    }
}

/// Guards the legal session lifecycle.
#[derive(Debug)]
pub struct SessionStateMachine {
    status: SessionStatus,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Recording,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Attempt a transition. Only `Recording -> terminal` is legal; a
    /// terminal status never changes again.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), CaptureError> {
        if self.status == SessionStatus::Recording && to.is_terminal() {
            self.status = to;
            Ok(())
        } else {
            Err(CaptureError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_reaches_each_terminal_status() {
        for target in [
            SessionStatus::Complete,
            SessionStatus::Cancelled,
            SessionStatus::Failed,
        ] {
            let mut sm = SessionStateMachine::new();
            sm.transition(target).unwrap();
            assert_eq!(sm.status(), target);
            assert!(sm.status().is_terminal());
        }
    }

    #[test]
    fn terminal_status_never_changes() {
        let mut sm = SessionStateMachine::new();
        sm.transition(SessionStatus::Complete).unwrap();

        for target in [
            SessionStatus::Recording,
            SessionStatus::Cancelled,
            SessionStatus::Failed,
        ] {
            assert!(sm.transition(target).is_err());
        }
        assert_eq!(sm.status(), SessionStatus::Complete);
    }

    #[test]
    fn no_transition_back_to_recording() {
        let mut sm = SessionStateMachine::new();
        let err = sm.transition(SessionStatus::Recording).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTransition { .. }));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            SessionStatus::Recording,
            SessionStatus::Complete,
            SessionStatus::Cancelled,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("bogus"), None);
    }
}
