//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DevsyncSettings::default()`]
//! 2. If `~/.devsync/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `DEVSYNC_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::DevsyncSettings;

/// Resolve the DevSync home directory (`~/.devsync`).
pub fn devsync_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".devsync")
}

/// Resolve the path to the settings file (`~/.devsync/settings.json`).
pub fn settings_path() -> PathBuf {
    devsync_home().join("settings.json")
}

/// Resolve the room database path from settings.
///
/// Absolute paths are used as-is; relative paths resolve under `~/.devsync`.
pub fn resolve_db_path(settings: &DevsyncSettings) -> PathBuf {
    match settings.storage.db_path.as_deref() {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => devsync_home().join(p),
        None => devsync_home().join("rooms.db"),
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DevsyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<DevsyncSettings> {
    let defaults = serde_json::to_value(DevsyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content =
            std::fs::read_to_string(path).map_err(|source| SettingsError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: DevsyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut DevsyncSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("DEVSYNC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("DEVSYNC_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u64("DEVSYNC_HANDSHAKE_TIMEOUT_MS", 10, 60_000) {
        settings.server.handshake_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("DEVSYNC_HEARTBEAT_INTERVAL_MS", 100, 3_600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("DEVSYNC_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("DEVSYNC_SEND_QUEUE", 1, 65_536) {
        settings.server.send_queue_capacity = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("DEVSYNC_DB_PATH") {
        settings.storage.db_path = Some(v);
    }
    if let Some(v) = read_env_bool("DEVSYNC_EPHEMERAL") {
        settings.storage.ephemeral = v;
    }

    // ── Execution ───────────────────────────────────────────────────
    if let Some(v) = read_env_string("DEVSYNC_PYTHON") {
        settings.execution.interpreter = v;
    }
    if let Some(v) = read_env_u64("DEVSYNC_EXEC_TIMEOUT_MS", 100, 600_000) {
        settings.execution.timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("DEVSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("DEVSYNC_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 5000, "host": "0.0.0.0"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = DevsyncSettings::default();
        assert_eq!(settings.version, defaults.version);
        assert_eq!(
            settings.server.send_queue_capacity,
            defaults.server.send_queue_capacity
        );
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"handshakeTimeoutMs": 500}, "execution": {"interpreter": "python3.12"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.handshake_timeout_ms, 500);
        assert_eq!(settings.execution.interpreter, "python3.12");
        assert_eq!(settings.execution.timeout_ms, 10_000);
        assert_eq!(settings.server.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Malformed { .. }));
    }

    #[test]
    fn load_wrong_type_is_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "not-a-port"}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Shape(_)));
    }

    #[test]
    fn load_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings_from_path(dir.path());
        assert!(matches!(result.unwrap_err(), SettingsError::Unreadable { .. }));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"sendQueueCapacity": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn load_rejects_zero_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"heartbeatIntervalMs": 0, "heartbeatTimeoutMs": 0}}"#,
        )
        .unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── resolve_db_path ─────────────────────────────────────────────

    #[test]
    fn db_path_absolute_kept() {
        let mut settings = DevsyncSettings::default();
        settings.storage.db_path = Some("/var/lib/devsync/rooms.db".into());
        assert_eq!(
            resolve_db_path(&settings),
            PathBuf::from("/var/lib/devsync/rooms.db")
        );
    }

    #[test]
    fn db_path_relative_under_home() {
        let mut settings = DevsyncSettings::default();
        settings.storage.db_path = Some("custom.db".into());
        assert!(resolve_db_path(&settings).ends_with(".devsync/custom.db"));
    }

    #[test]
    fn db_path_default() {
        let settings = DevsyncSettings::default();
        assert!(resolve_db_path(&settings).ends_with(".devsync/rooms.db"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("2000", 10, 60_000), Some(2000));
        assert_eq!(parse_u64_range("5", 10, 60_000), None);
        assert_eq!(parse_u64_range("abc", 10, 60_000), None);
    }

    #[test]
    fn parse_heartbeat_interval_bounds() {
        assert_eq!(parse_u64_range("0", 100, 3_600_000), None);
        assert_eq!(parse_u64_range("15000", 100, 3_600_000), Some(15_000));
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("256", 1, 65_536), Some(256));
        assert_eq!(parse_usize_range("0", 1, 65_536), None);
    }
}
