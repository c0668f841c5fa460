//! # lanchat
//!
//! LAN chat server binary: loads settings, starts the HTTP/WebSocket
//! listener, and shuts down cleanly on Ctrl-C.

#![deny(unsafe_code)]

mod lan;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lanchat_core::Profile;
use lanchat_core::logging::{LogFormat, init_subscriber};
use lanchat_server::{ChatServer, ServerConfig};
use lanchat_settings::{ChatSettings, load_settings_from_path, settings_path};

/// Chat server for the local network.
#[derive(Parser, Debug)]
#[command(name = "lanchat", about = "Chat server for the local network")]
struct Cli {
    /// Settings file (default `~/.lanchat/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Protocol profile: `full` or `basic` (overrides settings).
    #[arg(long)]
    profile: Option<Profile>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut ChatSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(profile) = self.profile {
            settings.server.profile = profile;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let server = ChatServer::new(ServerConfig::from(&settings.server));
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to start chat server")?;

    let advertised = lan::advertised_addr(addr);
    tracing::info!(
        bound = %addr,
        profile = %settings.server.profile,
        "lanchat ready: open http://{advertised}/ on any device in the network"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.graceful_shutdown().await {
        tracing::warn!("Some sessions did not close in time");
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
