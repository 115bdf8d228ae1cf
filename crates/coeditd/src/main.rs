//! Coedit Daemon (coeditd)
//!
//! The server process for Coedit - collaborative document synchronization.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (WebSocket on 8970, in-memory storage)
//! coeditd --tokens /etc/coedit/tokens.toml
//!
//! # Custom port
//! coeditd --port 9000 --tokens tokens.toml
//!
//! # With persistence
//! coeditd --db /var/lib/coedit/data.db --tokens tokens.toml
//!
//! # Tighter version retention
//! coeditd --max-versions 20 --tokens tokens.toml
//! ```
//!
//! The token file maps opaque bearer tokens to user ids:
//!
//! ```toml
//! [tokens]
//! "secret-token-1" = "alice"
//! "secret-token-2" = "bob"
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use coedit_hub::{RealtimeHub, StaticTokenResolver, WebSocketServer};
use coedit_store::{DocumentRepository, MemoryStorage, SqliteStorage, StorageAdapter};

/// Coedit Daemon - collaborative document sync server
#[derive(Parser, Debug)]
#[command(name = "coeditd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket port to listen on
    #[arg(long, env = "COEDIT_PORT", default_value = "8970")]
    port: u16,

    /// Bind address
    #[arg(long, env = "COEDIT_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// SQLite database path for persistence (default: in-memory only)
    #[arg(long, env = "COEDIT_DB")]
    db: Option<PathBuf>,

    /// Token configuration file (TOML, maps bearer tokens to user ids)
    #[arg(long, env = "COEDIT_TOKENS")]
    tokens: Option<PathBuf>,

    /// Versions retained per document
    #[arg(long, env = "COEDIT_MAX_VERSIONS", default_value = "50")]
    max_versions: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COEDIT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct TokenConfig {
    #[serde(default)]
    tokens: HashMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    print_banner();

    // Storage backend
    let adapter: Arc<dyn StorageAdapter> = if let Some(db_path) = &args.db {
        info!(path = %db_path.display(), "Initializing SQLite persistence");
        let storage = SqliteStorage::new(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Arc::new(storage)
    } else {
        info!("Running in-memory only (no --db specified)");
        Arc::new(MemoryStorage::new())
    };

    // Token resolution
    let resolver = match &args.tokens {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read token file {}", path.display()))?;
            let config: TokenConfig = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse token file {}", path.display()))?;
            info!(tokens = config.tokens.len(), "Token configuration loaded");
            StaticTokenResolver::new(config.tokens)
        }
        None => {
            warn!("No --tokens file configured; every connection will be rejected");
            StaticTokenResolver::default()
        }
    };

    let repository = Arc::new(DocumentRepository::with_max_versions(
        adapter,
        args.max_versions,
    ));
    let hub = Arc::new(RealtimeHub::new(repository, Arc::new(resolver)));
    let forwarder = hub.spawn_change_forwarder();

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("Invalid bind address")?;

    info!(
        addr = %addr,
        max_versions = args.max_versions,
        persistent = args.db.is_some(),
        "Starting Coedit daemon"
    );

    let server = WebSocketServer::new(hub, addr);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server_handle.abort();
    forwarder.abort();

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ┌─┐┌─┐┌─┐┌┬┐┬┌┬┐
  │  │ │├┤  │││ │
  └─┘└─┘└─┘─┴┘┴ ┴
  Collaborative Document Sync
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
