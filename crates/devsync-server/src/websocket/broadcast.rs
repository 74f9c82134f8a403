//! Fan-out of one payload to every member of a room.

use std::sync::Arc;

use devsync_core::{ConnectionId, RoomId};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_EVICTIONS_TOTAL};
use super::connection::{ClientConnection, SendOutcome};
use super::protocol::ServerMessage;
use super::registry::ConnectionRegistry;

/// Per-call delivery tally. Informational; failures never propagate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients whose queue accepted the payload.
    pub delivered: usize,
    /// Recipients whose queue was full.
    pub dropped: usize,
    /// Recipients found closed and removed from the registry.
    pub evicted: usize,
}

impl ConnectionRegistry {
    /// Send a pre-encoded text frame to every member of `room_id` except
    /// `exclude`.
    pub fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        payload: &Arc<String>,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryReport {
        let recipients: Vec<_> = self
            .room_members(room_id)
            .into_iter()
            .filter(|c| Some(c.id()) != exclude)
            .collect();
        debug!(%room_id, recipients = recipients.len(), "broadcast to room");
        self.deliver(&recipients, payload)
    }

    /// Encode `message` and broadcast it to `room_id`.
    pub fn broadcast_message(
        &self,
        room_id: &RoomId,
        message: &ServerMessage,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryReport {
        match message.encode() {
            Ok(payload) => self.broadcast_to_room(room_id, &payload, exclude),
            Err(e) => {
                warn!(%room_id, error = %e, "failed to encode room message");
                DeliveryReport::default()
            }
        }
    }

    /// Best-effort send to each recipient. Closed recipients are evicted.
    pub(crate) fn deliver(
        &self,
        recipients: &[Arc<ClientConnection>],
        payload: &Arc<String>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for conn in recipients {
            match conn.send(Arc::clone(payload)) {
                SendOutcome::Delivered => report.delivered += 1,
                SendOutcome::Dropped => {
                    report.dropped += 1;
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id(), room_id = %conn.room_id(), "outbound queue full, message dropped");
                }
                SendOutcome::Closed => {
                    if self.unregister(conn.id(), conn.room_id()) {
                        report.evicted += 1;
                        counter!(WS_EVICTIONS_TOTAL).increment(1);
                        info!(conn_id = %conn.id(), room_id = %conn.room_id(), "evicted closed connection");
                    }
                }
            }
        }
        report
    }
}
