//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup, before any metric is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Messages dropped on full outbound queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Connections evicted after a failed send (counter).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Code updates persisted and relayed (counter).
pub const ROOM_UPDATES_TOTAL: &str = "room_updates_total";
/// Code executions total (counter, labels: outcome).
pub const CODE_EXECUTIONS_TOTAL: &str = "code_executions_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(ROOM_UPDATES_TOTAL).increment(2);
        });
        let output = render(&handle);
        assert!(output.contains("room_updates_total 2"));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_DISCONNECTIONS_TOTAL,
            WS_BROADCAST_DROPS_TOTAL,
            WS_EVICTIONS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            ROOM_UPDATES_TOTAL,
            CODE_EXECUTIONS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
