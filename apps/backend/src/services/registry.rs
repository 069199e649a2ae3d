//! Room code → live coordinator.
//!
//! Rooms are opened lazily from the store on first use. A coordinator that
//! has gone idle stops by itself; its entry is reaped by [`RoomRegistry::sweep`]
//! or replaced on the next access.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::RoomState;
use crate::errors::domain::{DomainError, InfraErrorKind, NotFoundKind};
use crate::repos::EstimationStore;
use crate::services::coordinator::{spawn_room, RoomCommand, RoomConfig, RoomHandle};

pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    store: Arc<dyn EstimationStore>,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn EstimationStore>, config: RoomConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
            config,
        }
    }

    pub fn config(&self) -> RoomConfig {
        self.config
    }

    /// Whether a coordinator for `room_code` is currently registered.
    pub fn contains(&self, room_code: &str) -> bool {
        self.rooms.contains_key(room_code)
    }

    pub fn live_rooms(&self) -> usize {
        self.rooms.iter().filter(|e| !e.value().is_closed()).count()
    }

    /// Live handle for the room, loading it from the store if needed.
    pub async fn handle(&self, room_code: &str) -> Result<RoomHandle, DomainError> {
        let existing = self.rooms.get(room_code).map(|e| e.value().clone());
        if let Some(existing) = existing {
            if !existing.is_closed() {
                return Ok(existing);
            }
            // Let the stopped task flush its queue before reloading.
            existing.finished().await;
            self.rooms.remove_if(room_code, |_, h| h.is_closed());
        }

        let Some((session, stories)) = self.store.load_room(room_code).await? else {
            return Err(DomainError::not_found(
                NotFoundKind::Room,
                format!("room {room_code} not found"),
            ));
        };
        let state = RoomState::new(session, stories);

        let handle = match self.rooms.entry(room_code.to_string()) {
            Entry::Occupied(e) if !e.get().is_closed() => e.get().clone(),
            Entry::Occupied(mut e) => {
                let handle = spawn_room(state, self.store.clone(), self.config);
                e.insert(handle.clone());
                handle
            }
            Entry::Vacant(v) => {
                let handle = spawn_room(state, self.store.clone(), self.config);
                v.insert(handle.clone());
                info!(room_code, "room loaded");
                handle
            }
        };
        Ok(handle)
    }

    /// Queue a command, reopening the room once if its task just stopped.
    pub async fn dispatch(&self, room_code: &str, cmd: RoomCommand) -> Result<(), DomainError> {
        let handle = self.handle(room_code).await?;
        let Err(cmd) = handle.send(cmd).await else {
            return Ok(());
        };
        debug!(room_code, "room stopped under us, reopening");
        let handle = self.handle(room_code).await?;
        handle
            .send(cmd)
            .await
            .map_err(|_| room_unavailable(room_code))
    }

    /// Send a command built around a fresh reply channel and await the reply.
    pub async fn request<T>(
        &self,
        room_code: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(room_code, build(reply)).await?;
        rx.await.map_err(|_| room_unavailable(room_code))
    }

    /// Drop entries whose coordinator has exited. Returns how many were reaped.
    pub fn sweep(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, handle| !handle.is_closed());
        let reaped = before.saturating_sub(self.rooms.len());
        if reaped > 0 {
            debug!(reaped, "idle rooms reaped");
        }
        reaped
    }

    /// Periodic sweep; stops once the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep();
            }
        })
    }
}

fn room_unavailable(room_code: &str) -> DomainError {
    DomainError::infra(
        InfraErrorKind::RoomUnavailable,
        format!("room {room_code} is unavailable"),
    )
}
