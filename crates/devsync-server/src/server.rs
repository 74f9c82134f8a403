//! `DevsyncServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use devsync_core::RoomId;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::executor::{CodeRunner, ExecutionOutput};
use crate::health::{self, HealthResponse};
use crate::metrics::CODE_EXECUTIONS_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::store::RoomStore;
use crate::websocket::context::RealtimeContext;
use crate::websocket::protocol::ServerMessage;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_room_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, store and session settings.
    pub realtime: Arc<RealtimeContext>,
    /// Runs code for `/execute`.
    pub runner: Arc<dyn CodeRunner>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

/// The DevSync realtime server.
pub struct DevsyncServer {
    config: ServerConfig,
    realtime: Arc<RealtimeContext>,
    runner: Arc<dyn CodeRunner>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: Option<PrometheusHandle>,
}

impl DevsyncServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, store: Arc<dyn RoomStore>, runner: Arc<dyn CodeRunner>) -> Self {
        Self {
            realtime: Arc::new(RealtimeContext::new(store, config.clone())),
            config,
            runner,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            realtime: Arc::clone(&self.realtime),
            runner: Arc::clone(&self.runner),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{room_id}", get(ws_handler))
            .route("/api/rooms/{room_id}/execute", post(execute_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, "devsync server listening");
        Ok((addr, handle))
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.realtime.registry
    }

    /// Realtime context shared with sessions.
    pub fn realtime(&self) -> &Arc<RealtimeContext> {
        &self.realtime
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Error body for JSON endpoints.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Body of `POST /api/rooms/{room_id}/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Code to run.
    pub code: String,
    /// Optional stdin.
    #[serde(default)]
    pub input: Option<String>,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.realtime.registry;
    Json(health::health_check(
        state.start_time,
        registry.connection_count(),
        registry.room_count(),
        registry.user_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws/{room_id}
async fn ws_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = Arc::clone(&state.realtime);
    let token = state.shutdown.token();
    ws.max_message_size(ctx.config.max_message_size)
        .on_upgrade(move |socket| run_room_session(socket, RoomId::from(room_id), ctx, token))
}

/// POST /api/rooms/{room_id}/execute
///
/// Runs the code, then shows the result to everyone in the room, including
/// the caller's own socket.
async fn execute_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionOutput>, ApiError> {
    let room_id = RoomId::from(room_id);
    let output = match state.runner.run(&req.code, req.input.as_deref()).await {
        Ok(output) => output,
        Err(e) => {
            counter!(CODE_EXECUTIONS_TOTAL, "outcome" => "error").increment(1);
            warn!(%room_id, error = %e, "code execution failed");
            return Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: e.to_string(),
            });
        }
    };
    counter!(CODE_EXECUTIONS_TOTAL, "outcome" => "completed").increment(1);

    let report = state.realtime.registry.broadcast_message(
        &room_id,
        &ServerMessage::ExecutionResult {
            output: output.clone(),
        },
        None,
    );
    info!(%room_id, returncode = output.returncode, recipients = report.delivered, "execution result broadcast");
    Ok(Json(output))
}
