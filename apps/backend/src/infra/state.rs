use std::sync::Arc;
use std::time::Duration;

use crate::config::app::AppConfig;
use crate::config::db::{DbKind, DbSettings};
use crate::error::AppError;
use crate::infra::db::bootstrap_db;
use crate::repos::{EstimationStore, MemoryStore, SeaStore};
use crate::services::coordinator::RoomConfig;
use crate::services::registry::RoomRegistry;
use crate::services::sessions::SessionService;
use crate::services::tracker::{DisabledTracker, HttpTracker, IssueTracker};
use crate::state::app_state::AppState;
use crate::state::security_config::SecurityConfig;
use crate::utils::room_code::DEFAULT_ROOM_CODE_LEN;

/// Builder for [`AppState`], used by `main` and by tests.
pub struct StateBuilder {
    security: SecurityConfig,
    db: DbSettings,
    store: Option<Arc<dyn EstimationStore>>,
    tracker: Arc<dyn IssueTracker>,
    room: RoomConfig,
    room_code_len: usize,
    sweep_every: Option<Duration>,
}

impl StateBuilder {
    pub fn new(security: SecurityConfig) -> Self {
        Self {
            security,
            db: DbSettings::memory(),
            store: None,
            tracker: Arc::new(DisabledTracker),
            room: RoomConfig::default(),
            room_code_len: DEFAULT_ROOM_CODE_LEN,
            sweep_every: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let tracker: Arc<dyn IssueTracker> = match &config.tracker {
            Some(settings) => Arc::new(
                HttpTracker::new(settings.base_url.clone(), settings.token.clone())
                    .map_err(|e| AppError::config(format!("tracker client: {e}")))?,
            ),
            None => Arc::new(DisabledTracker),
        };
        Ok(Self::new(SecurityConfig::new(config.jwt_secret.as_bytes()))
            .with_db(config.db.clone())
            .with_tracker(tracker)
            .with_room_config(RoomConfig {
                idle_timeout: config.room_idle,
                presence_buffer: config.presence_buffer,
                ..RoomConfig::default()
            })
            .with_room_code_len(config.room_code_len)
            .with_sweeper(config.room_idle))
    }

    pub fn with_db(mut self, db: DbSettings) -> Self {
        self.db = db;
        self
    }

    /// Use an existing store instead of connecting one.
    pub fn with_store(mut self, store: Arc<dyn EstimationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_room_config(mut self, room: RoomConfig) -> Self {
        self.room = room;
        self
    }

    pub fn with_room_code_len(mut self, len: usize) -> Self {
        self.room_code_len = len;
        self
    }

    pub fn with_sweeper(mut self, every: Duration) -> Self {
        self.sweep_every = Some(every);
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        let store: Arc<dyn EstimationStore> = match (self.store, self.db.kind) {
            (Some(store), _) => store,
            (None, DbKind::Memory) => Arc::new(MemoryStore::new()),
            (None, _) => Arc::new(SeaStore::new(bootstrap_db(&self.db).await?)),
        };
        let registry = Arc::new(RoomRegistry::new(store.clone(), self.room));
        if let Some(every) = self.sweep_every {
            registry.spawn_sweeper(every);
        }
        let sessions = SessionService::new(store.clone(), registry, self.tracker)
            .with_room_code_len(self.room_code_len);
        Ok(AppState::new(store, Arc::new(sessions), self.security))
    }
}
