//! In-process room store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use devsync_core::RoomId;
use parking_lot::RwLock;

use super::{Result, RoomContent, RoomStore};

/// Room store that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<HashMap<RoomId, RoomContent>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with stored content.
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn persist_content_update(&self, room_id: &RoomId, content: &str) -> Result<()> {
        let entry = RoomContent {
            room_id: room_id.clone(),
            code: content.to_owned(),
            updated_at: Utc::now(),
        };
        let _ = self.rooms.write().insert(room_id.clone(), entry);
        Ok(())
    }

    async fn load_content(&self, room_id: &RoomId) -> Result<Option<RoomContent>> {
        Ok(self.rooms.read().get(room_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_room_loads_none() {
        let store = MemoryRoomStore::new();
        assert!(store.load_content(&"r1".into()).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryRoomStore::new();
        let room = RoomId::from("r1");
        store.persist_content_update(&room, "a = 1").await.unwrap();
        store.persist_content_update(&room, "a = 2").await.unwrap();
        let content = store.load_content(&room).await.unwrap().unwrap();
        assert_eq!(content.code, "a = 2");
        assert_eq!(content.room_id, room);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let store = MemoryRoomStore::new();
        store.persist_content_update(&"r1".into(), "one").await.unwrap();
        store.persist_content_update(&"r2".into(), "two").await.unwrap();
        assert_eq!(store.load_content(&"r1".into()).await.unwrap().unwrap().code, "one");
        assert_eq!(store.load_content(&"r2".into()).await.unwrap().unwrap().code, "two");
    }
}
