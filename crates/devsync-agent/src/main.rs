//! # devsync
//!
//! DevSync server binary: loads settings, opens the room store, and serves
//! room sessions until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use devsync_server::config::ServerConfig;
use devsync_server::executor::ProcessCodeRunner;
use devsync_server::server::DevsyncServer;
use devsync_server::store::{MemoryRoomStore, RoomStore, SqliteRoomStore};
use devsync_settings::DevsyncSettings;
use tracing::info;

/// DevSync realtime collaboration server.
#[derive(Parser, Debug)]
#[command(name = "devsync", about = "DevSync realtime collaboration server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` room database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep room content in memory only.
    #[arg(long)]
    ephemeral: bool,

    /// Settings file to load instead of `~/.devsync/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Fold flags into loaded settings. Flags win.
    fn apply(&self, settings: &mut DevsyncSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.storage.db_path = Some(path.to_string_lossy().into_owned());
        }
        if self.ephemeral {
            settings.storage.ephemeral = true;
        }
    }

    fn load_settings(&self) -> Result<DevsyncSettings> {
        let mut settings = match &self.settings {
            Some(path) => devsync_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => devsync_settings::load_settings().context("Failed to load settings")?,
        };
        self.apply(&mut settings);
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

fn open_store(settings: &DevsyncSettings) -> Result<Arc<dyn RoomStore>> {
    if settings.storage.ephemeral {
        info!("room content kept in memory only");
        return Ok(Arc::new(MemoryRoomStore::new()));
    }
    let path = devsync_settings::resolve_db_path(settings);
    let store = SqliteRoomStore::open(&path)
        .with_context(|| format!("Failed to open room database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_server(settings: &DevsyncSettings) -> Result<DevsyncServer> {
    let store = open_store(settings)?;
    let runner = Arc::new(ProcessCodeRunner::new(
        settings.execution.interpreter.clone(),
        Duration::from_millis(settings.execution.timeout_ms),
    ));
    Ok(DevsyncServer::new(
        ServerConfig::from(&settings.server),
        store,
        runner,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    if settings.logging.json {
        devsync_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        devsync_core::logging::init_subscriber(&settings.logging.level);
    }

    let metrics_handle =
        devsync_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = build_server(&settings)?.with_metrics(metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    info!(
        interpreter = %settings.execution.interpreter,
        "DevSync listening on http://{addr}"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    let _ = server.shutdown().drain(vec![handle], None).await;
    info!("Shutdown complete");
    Ok(())
}
