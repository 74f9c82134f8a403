//! Dispatch of one decoded client message.

use std::sync::Arc;

use devsync_core::UserId;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::metrics::ROOM_UPDATES_TOTAL;
use super::connection::ClientConnection;
use super::context::RealtimeContext;
use super::protocol::{ClientMessage, ProtocolError};

/// Decode and dispatch one inbound text frame.
///
/// An `Err` means the frame was not a protocol message and the session
/// should close. Everything else, including store failures, is handled here.
pub async fn handle_message(
    text: &str,
    conn: &Arc<ClientConnection>,
    ctx: &RealtimeContext,
) -> Result<(), ProtocolError> {
    let message = ClientMessage::decode(text)?;
    dispatch(message, text, conn, ctx).await;
    Ok(())
}

/// Act on an already-decoded message. `raw` is the frame it came from.
pub async fn dispatch(
    message: ClientMessage,
    raw: &str,
    conn: &Arc<ClientConnection>,
    ctx: &RealtimeContext,
) {
    match message {
        ClientMessage::Auth { user_uid } => {
            let _ = bind_identity(conn, user_uid, ctx);
        }
        ClientMessage::CodeUpdate { code } => {
            let room_id = conn.room_id();
            if let Err(e) = ctx.store.persist_content_update(room_id, &code).await {
                warn!(%room_id, conn_id = %conn.id(), error = %e, "failed to persist code update, not broadcasting");
                return;
            }
            counter!(ROOM_UPDATES_TOTAL).increment(1);
            // Peers get the sender's frame byte for byte.
            let payload = Arc::new(raw.to_owned());
            let report = ctx
                .registry
                .broadcast_to_room(room_id, &payload, Some(conn.id()));
            debug!(%room_id, delivered = report.delivered, "code update relayed");
        }
        ClientMessage::Unknown => {
            debug!(conn_id = %conn.id(), "ignoring unrecognized message type");
        }
    }
}

/// Bind `user_id` to `conn` unless it already has an identity.
pub fn bind_identity(conn: &Arc<ClientConnection>, user_id: UserId, ctx: &RealtimeContext) -> bool {
    if user_id.is_empty() {
        debug!(conn_id = %conn.id(), "ignoring auth with empty user_uid");
        return false;
    }
    if ctx.registry.register_user(conn, user_id.clone()) {
        info!(conn_id = %conn.id(), room_id = %conn.room_id(), %user_id, "connection authenticated");
        true
    } else {
        debug!(conn_id = %conn.id(), %user_id, "ignoring repeated auth");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::store::{MemoryRoomStore, MockRoomStore, RoomStore, StoreError};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    fn ctx_with(store: impl RoomStore + 'static) -> RealtimeContext {
        RealtimeContext::new(Arc::new(store), ServerConfig::default())
    }

    fn join(ctx: &RealtimeContext, id: &str, room: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::with_id(id.into(), room.into(), tx));
        ctx.registry.register_room(Arc::clone(&conn));
        (conn, rx)
    }

    #[tokio::test]
    async fn code_update_relayed_verbatim_to_peers_only() {
        let ctx = ctx_with(MemoryRoomStore::new());
        let (a, mut ra) = join(&ctx, "a", "r1");
        let (_b, mut rb) = join(&ctx, "b", "r1");

        let raw = r#"{"type":"code_update","code":"x=1"}"#;
        handle_message(raw, &a, &ctx).await.unwrap();

        assert_eq!(&*rb.try_recv().unwrap(), raw);
        assert!(ra.try_recv().is_err());
        let stored = ctx.store.load_content(&"r1".into()).await.unwrap().unwrap();
        assert_eq!(stored.code, "x=1");
    }

    #[tokio::test]
    async fn persist_happens_before_broadcast() {
        let mut store = MockRoomStore::new();
        let peer_rx: Arc<Mutex<Option<mpsc::Receiver<Arc<String>>>>> = Arc::new(Mutex::new(None));
        let seen_by_store = Arc::clone(&peer_rx);
        let _ = store
            .expect_persist_content_update()
            .withf(|room, code| room.as_str() == "r1" && code == "x=1")
            .times(1)
            .returning(move |_, _| {
                if let Some(rx) = seen_by_store.lock().as_mut() {
                    assert!(rx.try_recv().is_err(), "peer saw update before it was stored");
                }
                Ok(())
            });
        let ctx = ctx_with(store);
        let (a, _ra) = join(&ctx, "a", "r1");
        let (_b, rb) = join(&ctx, "b", "r1");
        *peer_rx.lock() = Some(rb);

        handle_message(r#"{"type":"code_update","code":"x=1"}"#, &a, &ctx)
            .await
            .unwrap();
        let mut rb = peer_rx.lock().take().unwrap();
        assert!(rb.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failed_persist_suppresses_broadcast() {
        let mut store = MockRoomStore::new();
        let _ = store
            .expect_persist_content_update()
            .returning(|_, _| Err(StoreError::Unavailable("disk full".into())));
        let ctx = ctx_with(store);
        let (a, _ra) = join(&ctx, "a", "r1");
        let (_b, mut rb) = join(&ctx, "b", "r1");

        let result = handle_message(r#"{"type":"code_update","code":"x"}"#, &a, &ctx).await;
        assert!(result.is_ok());
        assert!(rb.try_recv().is_err());
        assert_eq!(ctx.registry.room_size(&"r1".into()), 2);
    }

    #[tokio::test]
    async fn malformed_frame_is_error() {
        let ctx = ctx_with(MockRoomStore::new());
        let (a, _ra) = join(&ctx, "a", "r1");
        assert!(handle_message("{not json", &a, &ctx).await.is_err());
        assert!(handle_message(r#"{"code":"x"}"#, &a, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn unknown_type_ignored_and_not_forwarded() {
        let ctx = ctx_with(MockRoomStore::new());
        let (a, _ra) = join(&ctx, "a", "r1");
        let (_b, mut rb) = join(&ctx, "b", "r1");
        handle_message(r#"{"type":"cursor","pos":3}"#, &a, &ctx)
            .await
            .unwrap();
        assert!(rb.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_auth_binds_once() {
        let ctx = ctx_with(MockRoomStore::new());
        let (a, _ra) = join(&ctx, "a", "r1");
        handle_message(r#"{"type":"auth","user_uid":"u1"}"#, &a, &ctx)
            .await
            .unwrap();
        handle_message(r#"{"type":"auth","user_uid":"u2"}"#, &a, &ctx)
            .await
            .unwrap();
        assert_eq!(ctx.registry.user_of(a.id()), Some("u1".into()));
        assert!(ctx.registry.user_connections(&"u2".into()).is_empty());
    }

    #[test]
    fn empty_uid_not_bound() {
        let ctx = ctx_with(MockRoomStore::new());
        let (a, _ra) = join(&ctx, "a", "r1");
        assert!(!bind_identity(&a, "".into(), &ctx));
        assert_eq!(ctx.registry.user_count(), 0);
    }
}
