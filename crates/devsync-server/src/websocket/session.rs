//! Room session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! ```text
//! Connecting -> Joining -> Active -> Closed
//! ```
//!
//! - **Joining**: the connection is already a room member; the session waits
//!   up to `handshake_timeout` for `{"type":"auth","user_uid":...}`. A timeout
//!   or a malformed first frame leaves the connection anonymous. A valid
//!   non-`auth` first frame is processed as if Active. Shutdown or a dead
//!   writer ends the wait early.
//! - **Active**: frames are dispatched in arrival order. A frame that is not a
//!   protocol message closes the session.
//! - **Closed**: registry cleanup runs exactly once, when [`RoomSession`] is
//!   dropped.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use devsync_core::{RoomId, UserId};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_DISCONNECTIONS_TOTAL};
use super::connection::ClientConnection;
use super::context::RealtimeContext;
use super::handler::{bind_identity, dispatch, handle_message};
use super::protocol::{ClientMessage, ProtocolError};

/// Registry membership of one connection, released on drop.
pub struct RoomSession {
    connection: Arc<ClientConnection>,
    ctx: Arc<RealtimeContext>,
    started: Instant,
}

impl RoomSession {
    /// Create the connection and add it to `room_id`.
    pub fn on_connect(
        ctx: Arc<RealtimeContext>,
        room_id: RoomId,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        let connection = Arc::new(ClientConnection::new(room_id, tx));
        ctx.registry.register_room(Arc::clone(&connection));
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %connection.id(), room_id = %connection.room_id(), "client connected");
        Self {
            connection,
            ctx,
            started: Instant::now(),
        }
    }

    /// The live connection.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// Bind an identity; ignored if one is already bound.
    pub fn authenticate(&self, user_id: UserId) -> bool {
        bind_identity(&self.connection, user_id, &self.ctx)
    }

    /// Handle one inbound text frame.
    pub async fn on_message(&self, raw: &str) -> Result<(), ProtocolError> {
        handle_message(raw, &self.connection, &self.ctx).await
    }

    /// End the session.
    pub fn on_disconnect(self) {
        drop(self);
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        let conn = &self.connection;
        let removed = self.ctx.registry.unregister(conn.id(), conn.room_id());
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(self.started.elapsed().as_secs_f64());
        info!(
            conn_id = %conn.id(),
            room_id = %conn.room_id(),
            removed,
            dropped_messages = conn.drop_count(),
            "client disconnected"
        );
    }
}

enum Inbound {
    Text(String),
    Undecodable,
    Closed,
}

/// Next text-bearing frame. Control frames only refresh liveness.
async fn next_inbound(ws_rx: &mut SplitStream<WebSocket>, conn: &ClientConnection) -> Inbound {
    while let Some(frame) = ws_rx.next().await {
        conn.mark_alive();
        match frame {
            Ok(Message::Text(text)) => return Inbound::Text(text.as_str().to_owned()),
            Ok(Message::Binary(data)) => {
                return match String::from_utf8(data.to_vec()) {
                    Ok(text) => Inbound::Text(text),
                    Err(_) => {
                        debug!(conn_id = %conn.id(), len = data.len(), "received non-UTF8 binary frame");
                        Inbound::Undecodable
                    }
                };
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn.id(), "client sent close frame");
                return Inbound::Closed;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                debug!(conn_id = %conn.id(), error = %e, "websocket read failed");
                return Inbound::Closed;
            }
        }
    }
    Inbound::Closed
}

/// Forward queued frames to the socket and keep the connection alive.
///
/// The task ends when the queue closes, the client goes silent for longer
/// than `heartbeat_timeout`, or a single socket write stays blocked that
/// long.
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
    ctx: &RealtimeContext,
) -> JoinHandle<()> {
    let interval = ctx.config.heartbeat_interval();
    let silence_limit = ctx.config.heartbeat_timeout();
    let writer = async move {
        let mut ping_interval = tokio::time::interval(interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            let frame = tokio::select! {
                msg = send_rx.recv() => match msg {
                    Some(text) => Message::Text(text.to_string().into()),
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if conn.last_seen_elapsed() > silence_limit {
                        warn!(conn_id = %conn.id(), "client unresponsive for {silence_limit:?}, disconnecting");
                        break;
                    }
                    Message::Ping(Vec::new().into())
                }
            };
            match tokio::time::timeout(silence_limit, ws_tx.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(conn_id = %conn.id(), error = %e, "websocket write failed");
                    break;
                }
                Err(_) => {
                    // Socket is wedged; a close frame would block too.
                    warn!(conn_id = %conn.id(), "socket write blocked for {silence_limit:?}, disconnecting");
                    return;
                }
            }
        }
        let _ = tokio::time::timeout(silence_limit, ws_tx.close()).await;
    };
    tokio::spawn(writer.instrument(Span::current()))
}

/// Run a room session for an upgraded socket.
#[instrument(skip_all, fields(room_id = %room_id))]
pub async fn run_room_session(
    ws: WebSocket,
    room_id: RoomId,
    ctx: Arc<RealtimeContext>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(ctx.config.send_queue_capacity);

    let session = RoomSession::on_connect(Arc::clone(&ctx), room_id, send_tx);
    let conn = Arc::clone(session.connection());
    let mut outbound = spawn_writer(ws_tx, send_rx, Arc::clone(&conn), &ctx);

    // Joining
    let window = ctx.config.handshake_timeout();
    let mut pending = None;
    let first = tokio::select! {
        first = tokio::time::timeout(window, next_inbound(&mut ws_rx, &conn)) => first,
        _ = &mut outbound => {
            debug!(conn_id = %conn.id(), "writer stopped during handshake");
            session.on_disconnect();
            return;
        }
        () = shutdown.cancelled() => {
            debug!(conn_id = %conn.id(), "server shutting down during handshake");
            outbound.abort();
            session.on_disconnect();
            return;
        }
    };
    match first {
        Ok(Inbound::Text(text)) => match ClientMessage::decode(&text) {
            Ok(ClientMessage::Auth { user_uid }) => {
                let _ = session.authenticate(user_uid);
            }
            Ok(other) => pending = Some((other, text)),
            Err(e) => debug!(conn_id = %conn.id(), error = %e, "malformed handshake, continuing unauthenticated"),
        },
        Ok(Inbound::Undecodable) => {
            debug!(conn_id = %conn.id(), "undecodable handshake, continuing unauthenticated");
        }
        Ok(Inbound::Closed) => {
            outbound.abort();
            session.on_disconnect();
            return;
        }
        Err(_) => debug!(conn_id = %conn.id(), "no handshake within {window:?}, continuing unauthenticated"),
    }

    // Active
    if let Some((message, raw)) = pending {
        dispatch(message, &raw, &conn, &ctx).await;
    }

    loop {
        tokio::select! {
            inbound = next_inbound(&mut ws_rx, &conn) => match inbound {
                Inbound::Text(text) => {
                    if let Err(e) = session.on_message(&text).await {
                        warn!(conn_id = %conn.id(), error = %e, "closing session on malformed message");
                        break;
                    }
                }
                Inbound::Undecodable => {
                    warn!(conn_id = %conn.id(), "closing session on undecodable frame");
                    break;
                }
                Inbound::Closed => break,
            },
            _ = &mut outbound => {
                debug!(conn_id = %conn.id(), "writer stopped");
                break;
            }
            () = shutdown.cancelled() => {
                debug!(conn_id = %conn.id(), "server shutting down");
                break;
            }
        }
    }

    outbound.abort();
    session.on_disconnect();
}
