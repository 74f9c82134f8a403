//! Realtime room layer: connection registry, room broadcast, user
//! notifications, and the per-connection session protocol.

pub mod broadcast;
pub mod connection;
pub mod context;
pub mod handler;
pub mod notify;
pub mod protocol;
pub mod registry;
pub mod session;

pub use broadcast::DeliveryReport;
pub use connection::{ClientConnection, SendOutcome};
pub use context::RealtimeContext;
pub use notify::{JoinRequester, Notification, NotificationKind};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use registry::ConnectionRegistry;
pub use session::{RoomSession, run_room_session};
