use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ai::chat::{ChatOrchestrator, SessionState};

/// A session is locked for the whole time an event is being handled,
/// including while a reply streams.
pub type SharedSession = Arc<Mutex<SessionState>>;

pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    // Every live chat session keyed by its id
    pub sessions: HashMap<Uuid, SharedSession>,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: HashMap::new(),
        }
    }

    pub fn insert_session(&mut self, session: SessionState) -> Uuid {
        let id = session.id();
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Drop sessions that haven't handled an event for `max_idle`.
    /// Sessions busy with an event are always kept. Returns how many
    /// were removed.
    pub fn remove_idle_sessions(&mut self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(state) => state.last_active().elapsed() < max_idle,
            Err(_) => true,
        });
        before - self.sessions.len()
    }
}

/// Periodically remove idle sessions in a background task so sessions
/// abandoned without a `DELETE` don't pile up.
pub fn spawn_session_sweeper(
    shared_state: Arc<RwLock<AppState>>,
    every: Duration,
    max_idle: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = match shared_state.write() {
                Ok(mut state) => state.remove_idle_sessions(max_idle),
                Err(_) => {
                    tracing::error!("Unable to write shared state, stopping session sweeper");
                    break;
                }
            };
            if removed > 0 {
                tracing::info!("Removed {} idle sessions", removed);
            }
        }
    });
}
