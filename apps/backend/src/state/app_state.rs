use std::sync::Arc;

use super::security_config::SecurityConfig;
use crate::repos::EstimationStore;
use crate::services::sessions::SessionService;

/// Shared handles given to every handler and websocket session.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EstimationStore>,
    pub sessions: Arc<SessionService>,
    pub security: SecurityConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EstimationStore>,
        sessions: Arc<SessionService>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            security,
        }
    }

    /// Outbound queue size for each websocket presence.
    pub fn presence_buffer(&self) -> usize {
        self.sessions.registry().config().presence_buffer
    }
}
