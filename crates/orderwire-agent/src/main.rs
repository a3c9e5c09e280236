//! # orderwire-agent
//!
//! Binary entry point. `serve` runs the stream bridge; `watch` connects a
//! streaming client and logs every order update. Both run until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orderwire_bridge::{BridgeConfig, BridgeServer};
use orderwire_core::{Credential, CredentialStore};
use orderwire_logging::{LogFormat, LogLevel};
use orderwire_settings::OrderwireSettings;
use orderwire_stream::{StreamConfig, StreamingClient};

/// Order-update stream bridge and client.
#[derive(Parser, Debug)]
#[command(name = "orderwire-agent", about = "Order-update stream bridge and client")]
struct Cli {
    /// Settings file (defaults to `~/.orderwire/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket bridge.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,

        /// Upstream stream URL (overrides settings).
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Connect to a bridge and log order updates.
    Watch {
        /// Access token sent to the bridge.
        #[arg(long)]
        token: String,

        /// Bridge URL (overrides settings).
        #[arg(long)]
        url: Option<String>,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<OrderwireSettings> {
    let path = path.cloned().unwrap_or_else(orderwire_settings::settings_path);
    orderwire_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn bridge_config(settings: &OrderwireSettings, command: &Command) -> BridgeConfig {
    let mut config = BridgeConfig::from(&settings.bridge);
    if let Command::Serve {
        host,
        port,
        upstream,
    } = command
    {
        if let Some(host) = host {
            config.host.clone_from(host);
        }
        if let Some(port) = port {
            config.port = *port;
        }
        if let Some(upstream) = upstream {
            config.upstream_url.clone_from(upstream);
        }
    }
    config
}

fn stream_config(settings: &OrderwireSettings, url: Option<&String>) -> StreamConfig {
    let mut config = StreamConfig::from(&settings.stream);
    if let Some(url) = url {
        config.url.clone_from(url);
    }
    config
}

async fn serve(config: BridgeConfig) -> Result<()> {
    let shutdown_timeout = config.shutdown_timeout;
    let server = BridgeServer::new(config);
    let (addr, handle) = server.listen().await.context("Failed to bind bridge")?;

    tracing::info!(
        "orderwire bridge listening on ws://{addr}{} -> {}",
        server.config().path,
        server.config().upstream_url
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(open_pairs = server.connections().count(), "Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], shutdown_timeout)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn watch(config: StreamConfig, token: String) -> Result<()> {
    let credentials = CredentialStore::with_credential(Credential::new(token));
    let client = StreamingClient::new(config, credentials);

    let _status = client.on_status(|message| {
        tracing::info!(
            user_id = message.user_id.as_deref().unwrap_or_default(),
            order_status = message.order_status.as_deref().unwrap_or_default(),
            status_code = message.status_code.as_deref().unwrap_or_default(),
            raw = %message.raw,
            "order update"
        );
    });
    let _connection = client.on_connection(|connected| {
        tracing::info!(connected, "order stream connection changed");
    });
    let _errors = client.on_error(|error| {
        tracing::error!(code = error.code(), error = %error, "order stream failed");
    });

    client.connect();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Disconnecting...");
    client.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = load_settings(args.settings.as_ref())?;
    let level = LogLevel::from_str_lossy(
        args.log_level
            .as_deref()
            .unwrap_or(settings.logging.level.as_str()),
    );
    orderwire_logging::init_subscriber(level, LogFormat::from_json_flag(settings.logging.json));

    match &args.command {
        Command::Serve { .. } => serve(bridge_config(&settings, &args.command)).await,
        Command::Watch { token, url } => {
            watch(stream_config(&settings, url.as_ref()), token.clone()).await
        }
    }
}
