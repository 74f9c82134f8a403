//! # devsync-core
//!
//! Foundation types shared by every DevSync crate:
//!
//! - **Branded IDs**: `RoomId`, `UserId`, `ConnectionId` as newtypes so a room
//!   key can never be passed where a user identity is expected
//! - **Logging**: `tracing` subscriber setup used by the server binary

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{ConnectionId, RoomId, UserId};
