//! # devsync-settings
//!
//! Configuration management with layered sources for the DevSync server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DevsyncSettings::default()`]
//! 2. **User file**: `~/.devsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DEVSYNC_*` overrides (highest priority)
//!
//! Settings are passed explicitly to the server; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, resolve_db_path, settings_path};
pub use types::*;
