//! Reconnecting push-channel client: a `tokio-tungstenite` WebSocket
//! carrying JSON frames, with an auth handshake and heartbeat loop layered
//! on top of the reconnect-with-backoff structure.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::config::{BridgeConfig, ReconnectPolicy};
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::events::ServerEvent;

const APP_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Drives the connect/auth/read loop against the relay's push channel,
/// reconnecting with exponential backoff on every disconnect.
pub struct WsClient {
    config: BridgeConfig,
    dispatcher: Arc<Dispatcher>,
    reconnect: ReconnectPolicy,
}

impl WsClient {
    pub fn new(config: BridgeConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Runs forever, reconnecting on every error, until `shutdown` fires.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("push-channel client shutting down");
                return;
            }

            match self.connect_and_run(&mut shutdown, &mut attempt).await {
                Ok(()) => {
                    info!("push-channel connection closed cleanly");
                    return;
                }
                Err(e) => {
                    let delay = self.reconnect.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis(), "reconnecting to relay push channel");

                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = shutdown.changed() => {
                            info!("push-channel client shutting down during reconnect wait");
                            return;
                        }
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn connect_and_run(
        &self,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> Result<(), BridgeError> {
        let url = self.config.relay_ws_url();
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let auth_frame = json!({"type": "auth", "api_key": self.config.mailbox_api_key});
        write
            .send(Message::text(auth_frame.to_string()))
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;

        // Successful upgrade + auth handshake: reset the backoff unconditionally,
        // regardless of how long the previous connection stayed up.
        *attempt = 0;

        // Send an initial ping immediately so the relay's edge does not see
        // an idle socket before the first heartbeat tick fires.
        write
            .send(Message::text(json!({"type": "ping"}).to_string()))
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;

        info!(url = %url, "connected to relay push channel");

        let mut heartbeat = tokio::time::interval(APP_HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // the connect-time ping above covers this tick

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                return Err(BridgeError::Connection("write half closed".into()));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(BridgeError::Connection(format!(
                                "relay closed connection: {frame:?}"
                            )));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(BridgeError::Connection(e.to_string()));
                        }
                        None => {
                            return Err(BridgeError::Connection("stream ended by relay".into()));
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let ping = json!({"type": "ping"}).to_string();
                    if write.send(Message::text(ping)).await.is_err() {
                        return Err(BridgeError::Connection("heartbeat send failed".into()));
                    }
                }
                _ = shutdown.changed() => {
                    info!("push-channel client received shutdown signal");
                    let _ = write.close().await;
                    return Ok(());
                }
            }
        }
    }

    /// Parses one inbound frame and spawns its handling so a slow executor
    /// turn cannot stall the read loop.
    fn handle_frame(&self, text: &str) {
        let event: ServerEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "received malformed push-channel frame");
                return;
            }
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher.handle_event(event).await;
        });
    }
}
