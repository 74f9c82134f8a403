//! Room and user membership for live connections.
//!
//! Three maps sit behind one `parking_lot::Mutex`:
//!
//! - `rooms`: room ID to the connections that joined it, in join order
//! - `users`: user ID to that user's authenticated connections, in bind order
//! - `bindings`: connection ID to the user it authenticated as
//!
//! A connection is in exactly one room list from `register_room` until
//! `unregister`, and in at most one user list. Keys whose lists become empty
//! are removed so the maps never grow with dead rooms or users.
//!
//! The lock is never held across an `.await` or while sending. Callers take a
//! snapshot (`room_members`, `user_connections`) and deliver outside it.

use std::collections::HashMap;
use std::sync::Arc;

use devsync_core::{ConnectionId, RoomId, UserId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::connection::ClientConnection;

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<RoomId, Vec<Arc<ClientConnection>>>,
    users: HashMap<UserId, Vec<Arc<ClientConnection>>>,
    bindings: HashMap<ConnectionId, UserId>,
}

impl RegistryState {
    fn in_room(&self, conn: &ClientConnection) -> bool {
        self.rooms
            .get(conn.room_id())
            .is_some_and(|members| members.iter().any(|c| c.id() == conn.id()))
    }
}

/// Process-wide registry of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the member list of the room it joined.
    ///
    /// Registering the same connection twice is a no-op.
    pub fn register_room(&self, conn: Arc<ClientConnection>) {
        let mut state = self.state.lock();
        if state.in_room(&conn) {
            warn!(conn_id = %conn.id(), room_id = %conn.room_id(), "connection already registered in room");
            return;
        }
        let room_id = conn.room_id().clone();
        let members = state.rooms.entry(room_id.clone()).or_default();
        members.push(conn);
        debug!(%room_id, members = members.len(), "connection joined room");
    }

    /// Bind an identity to a registered connection.
    ///
    /// Returns `false` (and changes nothing) when the connection already has an
    /// identity or is no longer registered.
    pub fn register_user(&self, conn: &Arc<ClientConnection>, user_id: UserId) -> bool {
        let mut state = self.state.lock();
        if state.bindings.contains_key(conn.id()) {
            debug!(conn_id = %conn.id(), "connection already bound to a user");
            return false;
        }
        if !state.in_room(conn) {
            debug!(conn_id = %conn.id(), "refusing to bind unregistered connection");
            return false;
        }
        let _ = state.bindings.insert(conn.id().clone(), user_id.clone());
        let conns = state.users.entry(user_id.clone()).or_default();
        conns.push(Arc::clone(conn));
        debug!(%user_id, connections = conns.len(), "connection bound to user");
        true
    }

    /// Remove a connection from its room and, if bound, from its user.
    ///
    /// Returns whether anything was removed; a second call for the same
    /// connection returns `false`.
    pub fn unregister(&self, conn_id: &ConnectionId, room_id: &RoomId) -> bool {
        let mut state = self.state.lock();
        let mut removed = false;

        if let Some(members) = state.rooms.get_mut(room_id) {
            let before = members.len();
            members.retain(|c| c.id() != conn_id);
            removed |= members.len() != before;
            if members.is_empty() {
                let _ = state.rooms.remove(room_id);
            }
        }

        if let Some(user_id) = state.bindings.remove(conn_id) {
            removed = true;
            if let Some(conns) = state.users.get_mut(&user_id) {
                conns.retain(|c| c.id() != conn_id);
                if conns.is_empty() {
                    let _ = state.users.remove(&user_id);
                }
            }
        }

        removed
    }

    /// Snapshot of a room's members in join order.
    pub fn room_members(&self, room_id: &RoomId) -> Vec<Arc<ClientConnection>> {
        self.state
            .lock()
            .rooms
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of a user's connections in bind order.
    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<ClientConnection>> {
        self.state
            .lock()
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// User bound to a connection, if any.
    pub fn user_of(&self, conn_id: &ConnectionId) -> Option<UserId> {
        self.state.lock().bindings.get(conn_id).cloned()
    }

    /// Live connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.state.lock().rooms.values().map(Vec::len).sum()
    }

    /// Rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Users with at least one authenticated connection.
    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// Members of one room.
    pub fn room_size(&self, room_id: &RoomId) -> usize {
        self.state.lock().rooms.get(room_id).map_or(0, Vec::len)
    }

    /// Check the structural invariants. Test helper.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.state.lock();
        for (room_id, members) in &state.rooms {
            assert!(!members.is_empty(), "empty room list kept for {room_id}");
            for conn in members {
                assert_eq!(conn.room_id(), room_id);
            }
            let mut ids: Vec<_> = members.iter().map(|c| c.id().clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), members.len(), "duplicate member in {room_id}");
        }
        for (user_id, conns) in &state.users {
            assert!(!conns.is_empty(), "empty user list kept for {user_id}");
            for conn in conns {
                assert_eq!(state.bindings.get(conn.id()), Some(user_id));
                assert!(state.in_room(conn), "user connection missing from its room");
            }
        }
        let bound: usize = state.users.values().map(Vec::len).sum();
        assert_eq!(bound, state.bindings.len());
    }
}
