//! Room content persistence.
//!
//! The realtime layer only needs to write the latest code of a room before
//! fanning it out, and the HTTP layer reads it back. [`RoomStore`] is that
//! seam:
//!
//! - **[`memory`]**: `HashMap` behind a `parking_lot::RwLock`, for tests and
//!   `--ephemeral` runs
//! - **[`sqlite`]**: one `rooms` row per room on an `r2d2` pool

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devsync_core::RoomId;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryRoomStore;
pub use sqlite::SqliteRoomStore;

/// Errors from a room store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Blocking task failed to complete.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Stored timestamp could not be parsed.
    #[error("corrupt timestamp for room {room_id}: {value}")]
    CorruptTimestamp {
        /// Room whose row is bad.
        room_id: String,
        /// Raw column value.
        value: String,
    },

    /// Store refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Latest known content of one room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomContent {
    /// Room key.
    pub room_id: RoomId,
    /// Full code buffer.
    pub code: String,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Persistence collaborator for room code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Replace the stored code of `room_id`, creating the room row if needed.
    async fn persist_content_update(&self, room_id: &RoomId, content: &str) -> Result<()>;

    /// Latest stored code of `room_id`, if any.
    async fn load_content(&self, room_id: &RoomId) -> Result<Option<RoomContent>>;
}
