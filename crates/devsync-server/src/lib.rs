//! # devsync-server
//!
//! Realtime layer of the collaborative editor.
//!
//! - `WebSocket` room sessions at `/ws/{room_id}`: optional `auth` handshake,
//!   `code_update` persisted then relayed to the other room members
//! - Connection registry indexed by room and by authenticated user
//! - Per-user notifications (join requests, sharing, removal)
//! - `POST /api/rooms/{room_id}/execute` with the result pushed to the room
//! - Health, Prometheus metrics, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod websocket;
