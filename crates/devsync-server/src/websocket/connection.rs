//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use devsync_core::{ConnectionId, RoomId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of handing one message to a connection's outbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Delivered,
    /// Queue full; the message was discarded but the connection is still live.
    Dropped,
    /// Writer task is gone; the connection can never deliver again.
    Closed,
}

/// One live WebSocket connection inside a room.
///
/// The room is fixed at upgrade time. The bound user (if any) lives in the
/// registry, not here, so identity and membership change under one lock.
pub struct ClientConnection {
    id: ConnectionId,
    room_id: RoomId,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Last inbound frame of any kind (text, ping, pong).
    last_seen: Mutex<Instant>,
    /// Messages discarded because the outbound queue was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection with a freshly minted ID.
    pub fn new(room_id: RoomId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(ConnectionId::new(), room_id, tx)
    }

    /// Create a connection with a caller-chosen ID.
    pub fn with_id(id: ConnectionId, room_id: RoomId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            room_id,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Room joined at connect time.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Enqueue a text frame without waiting.
    pub fn send(&self, message: Arc<String>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or since connect).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
