//! Test application state and a scriptable tracker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use poker_backend::config::db::DbSettings;
use poker_backend::domain::{Role, RoleEstimates};
use poker_backend::infra::state::StateBuilder;
use poker_backend::repos::MemoryStore;
use poker_backend::services::coordinator::RoomConfig;
use poker_backend::services::tracker::{IssueTracker, TrackerError};
use poker_backend::state::app_state::AppState;
use poker_backend::state::security_config::SecurityConfig;

pub const TEST_SECRET: &str = "test-secret-for-poker-backend";

pub fn test_security() -> SecurityConfig {
    SecurityConfig::new(TEST_SECRET)
}

/// State over a fresh in-memory store.
pub async fn build_test_state() -> AppState {
    StateBuilder::new(test_security())
        .build()
        .await
        .expect("memory state should build")
}

/// State over a store and tracker the test keeps handles to.
pub async fn build_state_with(
    store: Arc<MemoryStore>,
    tracker: Arc<dyn IssueTracker>,
    room: RoomConfig,
) -> AppState {
    StateBuilder::new(test_security())
        .with_store(store)
        .with_tracker(tracker)
        .with_room_config(room)
        .build()
        .await
        .expect("state should build")
}

/// State over a migrated in-memory SQLite database.
pub async fn build_sqlite_state() -> AppState {
    StateBuilder::new(test_security())
        .with_db(DbSettings::sqlite_memory())
        .build()
        .await
        .expect("sqlite state should build")
}

pub fn short_idle_room() -> RoomConfig {
    RoomConfig {
        idle_timeout: Duration::from_millis(50),
        ..RoomConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    Create {
        planning_unit: String,
        title: String,
        roles: Vec<String>,
    },
    Push {
        key: String,
        hours: Vec<(String, u32)>,
    },
}

/// Records every call; fails them all while `failing` is set.
#[derive(Default)]
pub struct RecordingTracker {
    calls: Mutex<Vec<TrackerCall>>,
    failing: Mutex<bool>,
}

impl RecordingTracker {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().clone()
    }

    fn outcome(&self) -> Result<(), TrackerError> {
        if *self.failing.lock() {
            return Err(TrackerError::Status {
                status: 502,
                body: "tracker down".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn create_item(
        &self,
        planning_unit: &str,
        title: &str,
        roles: &[Role],
    ) -> Result<String, TrackerError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(TrackerCall::Create {
                planning_unit: planning_unit.to_string(),
                title: title.to_string(),
                roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            });
            calls.len()
        };
        self.outcome()?;
        Ok(format!("{planning_unit}-{n}"))
    }

    async fn push_estimate(&self, key: &str, hours: &RoleEstimates) -> Result<(), TrackerError> {
        self.calls.lock().push(TrackerCall::Push {
            key: key.to_string(),
            hours: hours
                .iter()
                .map(|(role, h)| (role.as_str().to_string(), *h))
                .collect(),
        });
        self.outcome()
    }
}
