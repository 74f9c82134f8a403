//! `SQLite`-backed room store.
//!
//! One row per room in `rooms(id, code, updated_at)`. Each update is a single
//! upsert, so a write is atomic per room. Queries run on the blocking pool.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devsync_core::RoomId;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{Result, RoomContent, RoomStore, StoreError};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS rooms (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;\
             PRAGMA synchronous = NORMAL;",
        )
    }
}

/// Room store on a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteRoomStore {
    pool: ConnectionPool,
}

impl SqliteRoomStore {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(SqliteConnectionManager::file(path))?;
        Self::with_pool(pool).inspect(|_| info!(path = %path.display(), "room store opened"))
    }

    /// Single-connection in-memory database.
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool is capped at one.
    pub fn in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: ConnectionPool) -> Result<Self> {
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn persist_content_update(&self, room_id: &RoomId, content: &str) -> Result<()> {
        let pool = self.pool.clone();
        let id = room_id.to_string();
        let code = content.to_owned();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            let changed = conn.execute(
                "INSERT INTO rooms (id, code, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET code = excluded.code, updated_at = excluded.updated_at",
                params![id, code, Utc::now().to_rfc3339()],
            )?;
            debug!(room_id = %id, changed, "room content persisted");
            Ok(())
        })
        .await?
    }

    async fn load_content(&self, room_id: &RoomId) -> Result<Option<RoomContent>> {
        let pool = self.pool.clone();
        let id = room_id.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<RoomContent>> {
            let conn = pool.get()?;
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT code, updated_at FROM rooms WHERE id = ?1",
                    params![id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((code, updated_at)) = row else {
                return Ok(None);
            };
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|_| StoreError::CorruptTimestamp {
                    room_id: id.to_string(),
                    value: updated_at.clone(),
                })?
                .with_timezone(&Utc);
            Ok(Some(RoomContent {
                room_id: id,
                code,
                updated_at,
            }))
        })
        .await?
    }
}
