//! Agent mailbox relay server.
//!
//! HTTP API for agent registration, connection handshakes, and encrypted
//! message relay, with a per-agent WebSocket push channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use amb_crypto::ContentCipher;
use clap::Parser;
use tracing::{info, warn};

use amb_relay::registry::push_hub::PushHub;
use amb_relay::server::{self, AppState};
use amb_relay::storage::RelayDatabase;

#[derive(Parser, Debug)]
#[command(name = "amb-relay")]
#[command(version, about = "Agent mailbox relay server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8000", env = "AMB_RELAY_ADDR")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "AMB_RELAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// 64-character hex content-encryption key. If unset, an ephemeral key
    /// is generated and a warning logged — encrypted content will not
    /// survive a restart.
    #[arg(long, env = "AMB_ENCRYPTION_KEY")]
    encryption_key: Option<String>,

    /// Emit structured JSON log lines instead of human-readable text.
    #[arg(long, env = "AMB_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    amb_core::tracing_init::init_tracing("amb_relay=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "starting amb-relay"
    );

    let db = match &args.db_path {
        Some(path) => {
            info!(path = %path.display(), "opening relay database");
            RelayDatabase::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "opening relay database (default path)");
            RelayDatabase::open(&default_path).await?
        }
    };

    let cipher = match &args.encryption_key {
        Some(hex_key) => Arc::new(ContentCipher::from_hex(hex_key)?),
        None => {
            warn!(
                "AMB_ENCRYPTION_KEY not set — generated ephemeral key for dev mode. \
                 Set AMB_ENCRYPTION_KEY in production to persist encrypted data across restarts."
            );
            Arc::new(ContentCipher::new(ContentCipher::generate_key()))
        }
    };

    let state = AppState {
        db,
        cipher,
        push_hub: PushHub::new(),
    };

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;

    info!(addr = %args.addr, "relay listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    info!("relay stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".amb").join("relay.db"))
}
