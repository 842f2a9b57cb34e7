use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{RecordingSession, SessionConfig};
use crate::store::Store;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The persistence store (the collaborator read surface)
    pub store: Arc<dyn Store>,

    /// Active recording sessions (session_id -> session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<RecordingSession>>>>,

    /// Defaults for new sessions
    pub session_config: SessionConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, session_config: SessionConfig) -> Self {
        Self {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_config,
        }
    }
}
