//! Agent mailbox bridge daemon.
//!
//! Runs a reconnecting WebSocket client against the relay's push channel,
//! routing each incoming message into this agent's local executor and
//! plumbing the reply back.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use amb_bridge::config::BridgeConfig;
use amb_bridge::dispatch::Dispatcher;
use amb_bridge::executor::GatewayClient;
use amb_bridge::relay_client::RelayClient;
use amb_bridge::ws_client::WsClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::parse();

    amb_core::tracing_init::init_tracing("amb_bridge=info", config.log_json);

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    // reqwest is built with `rustls-no-provider`; install a crypto provider
    // before any TLS connection (relay HTTP client, push-channel WSS) is made.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        relay = %config.relay_http_url(),
        "starting amb-bridge"
    );

    let relay = RelayClient::new(config.relay_http_url(), config.mailbox_api_key.clone())?;
    let executor = GatewayClient::new(&config);
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), relay, executor));
    let ws_client = WsClient::new(config, dispatcher);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::select! {
        () = ws_client.run(shutdown_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    }

    info!("bridge stopped");
    Ok(())
}
