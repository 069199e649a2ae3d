//! Ordered fan-out of room events to connected presences.
//!
//! Owned by the room coordinator, so it needs no locking. Delivery is a
//! `try_send` per presence and never waits on a slow client.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Participant, Role, RoomEvent, RoomSnapshot};

/// One event with its per-room sequence number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub seq: u64,
    pub event: RoomEvent,
}

/// What a presence's outbound queue carries.
#[derive(Debug, Clone)]
pub enum Outbound {
    Snapshot(Box<RoomSnapshot>),
    Event(Arc<Envelope>),
}

pub type PresenceSink = mpsc::Sender<Outbound>;

#[derive(Debug)]
struct Presence {
    participant: Participant,
    sink: PresenceSink,
}

/// Why a presence was dropped during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Closed,
    Stalled,
}

#[derive(Debug, Default)]
pub struct Broadcaster {
    /// Join order.
    presences: Vec<Presence>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.presences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.presences.len()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.presences
            .iter()
            .map(|p| p.participant.clone())
            .collect()
    }

    pub fn add(&mut self, participant: Participant, sink: PresenceSink) {
        self.presences.push(Presence { participant, sink });
    }

    pub fn remove(&mut self, presence_id: Uuid) -> Option<Participant> {
        let idx = self
            .presences
            .iter()
            .position(|p| p.participant.presence_id == presence_id)?;
        Some(self.presences.remove(idx).participant)
    }

    pub fn set_role(&mut self, presence_id: Uuid, role: Option<Role>) -> Option<Participant> {
        let presence = self
            .presences
            .iter_mut()
            .find(|p| p.participant.presence_id == presence_id)?;
        presence.participant.role = role;
        Some(presence.participant.clone())
    }

    /// Deliver to every presence. Presences whose queue is closed or full are
    /// removed and returned; dropping a stalled presence's sender ends its
    /// stream, which closes the connection.
    pub fn fan_out(&mut self, envelope: Arc<Envelope>) -> Vec<(Participant, DropReason)> {
        let mut dropped = Vec::new();
        self.presences.retain(|presence| {
            match presence.sink.try_send(Outbound::Event(envelope.clone())) {
                Ok(()) => true,
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        presence_id = %presence.participant.presence_id,
                        "presence queue closed"
                    );
                    dropped.push((presence.participant.clone(), DropReason::Closed));
                    false
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        presence_id = %presence.participant.presence_id,
                        identity = %presence.participant.identity,
                        seq = envelope.seq,
                        "evicting stalled presence"
                    );
                    dropped.push((presence.participant.clone(), DropReason::Stalled));
                    false
                }
            }
        });
        dropped
    }
}
