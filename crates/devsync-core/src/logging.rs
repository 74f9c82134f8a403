//! Structured logging setup on top of `tracing`.
//!
//! Every crate logs through the `tracing` macros with structured fields
//! (`room_id`, `conn_id`, `user_id`). The binary installs a single compact
//! stderr subscriber at startup.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails if already set
    let _ = subscriber.try_init();
}

/// Initialize a JSON-lines subscriber on stderr (for log shipping).
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        // Multiple calls should be safe (no-op after first)
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }
}
