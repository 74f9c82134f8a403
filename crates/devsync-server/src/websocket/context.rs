//! Shared dependencies handed to every room session.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::store::RoomStore;

use super::registry::ConnectionRegistry;

/// Everything a session needs besides its socket.
#[derive(Clone)]
pub struct RealtimeContext {
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Room content persistence.
    pub store: Arc<dyn RoomStore>,
    /// Timeouts and queue sizes.
    pub config: ServerConfig,
}

impl RealtimeContext {
    /// Build a context around a fresh registry.
    pub fn new(store: Arc<dyn RoomStore>, config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            store,
            config,
        }
    }
}
