//! # arbor-chat
//!
//! Chat room server binary.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use arbor_server::ServerConfig;
use arbor_server::telemetry::{LogFormat, init_tracing};
use clap::Parser;

/// Arbor chat server.
#[derive(Parser, Debug)]
#[command(name = "arbor-chat", about = "Arbor RPC chat room server")]
struct Cli {
    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// JSON config file merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn log_format(&self) -> LogFormat {
        if self.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    /// Load config from file and env, then apply flags on top.
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = arbor_server::load_config(self.config.as_deref())
            .context("Failed to load server config")?;
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.validate().context("Invalid server config")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _ = init_tracing(&args.log_level, args.log_format());

    let config = args.server_config()?;
    let server = arbor_chat::build_server(config).context("Invalid server config")?;
    let handle = server.start().await.context("Failed to bind server")?;

    tracing::info!(
        "arbor-chat listening on {}{} ({} methods)",
        handle.origin(),
        server.config().base_path,
        server.paths().len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    handle.shutdown(None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
