//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only needs
//! to name the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevsyncSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Network and realtime settings.
    pub server: ServerSettings,
    /// Room-state persistence settings.
    pub storage: StorageSettings,
    /// Code execution settings.
    pub execution: ExecutionSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for DevsyncSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "devsync".to_string(),
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            execution: ExecutionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl DevsyncSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.handshake_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.handshakeTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be greater than zero".into(),
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be greater than zero".into(),
            ));
        }
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutMs must not be shorter than heartbeatIntervalMs".into(),
            ));
        }
        if self.execution.timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "execution.timeoutMs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and realtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// How long a new connection may take to send its `auth` handshake.
    pub handshake_timeout_ms: u64,
    /// Interval between server Ping frames.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            handshake_timeout_ms: 2_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_queue_capacity: 256,
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

/// Room-state persistence settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// `SQLite` database path. Relative paths resolve under `~/.devsync`;
    /// `None` uses `~/.devsync/rooms.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    /// Keep room state in memory only.
    pub ephemeral: bool,
}

/// Code execution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionSettings {
    /// Interpreter invoked on the submitted code.
    pub interpreter: String,
    /// Wall-clock limit for one run.
    pub timeout_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = DevsyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.server.handshake_timeout_ms, 2_000);
        assert_eq!(settings.execution.timeout_ms, 10_000);
        assert_eq!(settings.execution.interpreter, "python3");
        assert!(!settings.storage.ephemeral);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(DevsyncSettings::default()).unwrap();
        assert_eq!(json["server"]["handshakeTimeoutMs"], 2_000);
        assert_eq!(json["server"]["sendQueueCapacity"], 256);
        assert!(json["storage"].get("dbPath").is_none());
    }

    #[test]
    fn zero_handshake_timeout_rejected() {
        let mut settings = DevsyncSettings::default();
        settings.server.handshake_timeout_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("handshakeTimeoutMs"));
    }

    #[test]
    fn zero_queue_rejected() {
        let mut settings = DevsyncSettings::default();
        settings.server.send_queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_heartbeat_interval_rejected() {
        let mut settings = DevsyncSettings::default();
        settings.server.heartbeat_interval_ms = 0;
        settings.server.heartbeat_timeout_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeatIntervalMs"));
    }

    #[test]
    fn heartbeat_timeout_shorter_than_interval_rejected() {
        let mut settings = DevsyncSettings::default();
        settings.server.heartbeat_interval_ms = 60_000;
        settings.server.heartbeat_timeout_ms = 10_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_struct_uses_defaults() {
        let server: ServerSettings = serde_json::from_str(r#"{"port": 7000}"#).unwrap();
        assert_eq!(server.port, 7000);
        assert_eq!(server.host, "0.0.0.0");
    }
}
