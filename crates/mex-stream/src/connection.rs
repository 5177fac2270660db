//! WebSocket connection manager.
//!
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff, authentication and subscription replay after reconnect. The
//! read half is drained by exactly one task; every text frame goes
//! through the dispatcher sequentially.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ack::AckRegistry;
use crate::dispatcher::Dispatcher;
use crate::error::{StreamError, StreamResult};
use crate::events::{EventSink, FeedEvent};
use crate::message::Request;
use crate::session::SessionHandshake;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Channels subscribed on every (re)connect, e.g. `orderBookL2:XBTUSD`.
    pub channels: Vec<String>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Interval between keepalive pings.
    pub ping_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            channels: Vec::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            ping_interval_ms: 5000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<AckRegistry>,
    handshake: Option<Arc<SessionHandshake>>,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_count: Arc<RwLock<u32>>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<String>>>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<AckRegistry>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        Self {
            config,
            dispatcher,
            registry,
            handshake: None,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_count: Arc::new(RwLock::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Authenticate after every (re)connect; subscriptions are sent once
    /// the handshake ack arrives.
    pub fn with_handshake(mut self, handshake: SessionHandshake) -> Self {
        self.handshake = Some(Arc::new(handshake));
        self
    }

    /// Sender for outbound text frames. Clonable and reconnect-safe.
    pub fn outbound(&self) -> mpsc::Sender<String> {
        self.outbound_tx.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Signal graceful shutdown; the run loop exits promptly.
    pub fn shutdown(&self) {
        info!("connection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown, reconnecting on failure.
    pub async fn run(&self) -> StreamResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            match self.try_connect().await {
                Ok(()) => {
                    info!("websocket connection closed");
                }
                Err(e) => {
                    error!(error = %e, desync = e.is_desync(), "websocket connection error");
                }
            }

            // Pending waiters will never get their acks on this socket.
            self.registry.fail_all("connection lost");

            if self.is_shutdown() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "max reconnection attempts reached");
                return Err(StreamError::ConnectionFailed(
                    "max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> StreamResult<()> {
        info!(url = %self.config.url, "connecting to websocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        *self.reconnect_count.write() = 0;
        info!("websocket connected");

        match &self.handshake {
            Some(handshake) => self.spawn_authenticate(Arc::clone(handshake)),
            None => self.queue_subscriptions().await,
        }

        let mut ping_interval =
            tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.reset();

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "failed to send close frame during shutdown");
                    }
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if text == "pong" {
                                debug!("received keepalive pong");
                            } else {
                                self.handle_frame(&text)?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("received pong");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "websocket closed by server");
                            return Err(StreamError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "websocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("websocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    if let Some(frame) = outbound {
                        write.send(Message::Text(frame)).await?;
                    }
                }

                _ = ping_interval.tick() => {
                    // Venue keepalive: literal "ping", answered with "pong".
                    write.send(Message::Text("ping".to_string())).await?;
                }
            }
        }
    }

    /// Dispatch one inbound frame, deciding whether an error is fatal
    /// for the socket. A frame that fails to decode is logged and
    /// dropped; only a desync means the mirrored state is stale and the
    /// socket must be recycled for fresh snapshots.
    fn handle_frame(&self, text: &str) -> StreamResult<()> {
        match self.dispatcher.handle(text) {
            Ok(()) => Ok(()),
            Err(e) if e.is_desync() => Err(e),
            Err(e) => {
                warn!(error = %e, frame = text, "dropping undecodable frame");
                Ok(())
            }
        }
    }

    /// Authenticate on an independent task so the read loop keeps
    /// draining; the ack can only resolve through the dispatcher.
    fn spawn_authenticate(&self, handshake: Arc<SessionHandshake>) {
        tokio::spawn(run_handshake(
            handshake,
            self.outbound_tx.clone(),
            Arc::clone(&self.registry),
            self.config.channels.clone(),
            self.dispatcher.events(),
        ));
    }

    async fn queue_subscriptions(&self) {
        if !self.config.channels.is_empty() {
            send_subscribe(&self.outbound_tx, &self.config.channels).await;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        let delay = delay.min(max);

        Duration::from_millis(delay + rand_jitter())
    }
}

/// Subscriptions go out only once the auth ack arrives; a failed
/// handshake is published on the event sink so the session owner can
/// react instead of silently running an unauthenticated socket.
async fn run_handshake(
    handshake: Arc<SessionHandshake>,
    outbound: mpsc::Sender<String>,
    registry: Arc<AckRegistry>,
    channels: Vec<String>,
    sink: EventSink,
) {
    match handshake.authenticate(&outbound, &registry).await {
        Ok(()) => {
            if !channels.is_empty() {
                send_subscribe(&outbound, &channels).await;
            }
        }
        Err(e) => {
            error!(error = %e, "authentication failed");
            sink.publish(FeedEvent::AuthFailed {
                error: e.to_string(),
            });
        }
    }
}

async fn send_subscribe(outbound: &mpsc::Sender<String>, channels: &[String]) {
    let request = Request::subscribe(channels);
    match serde_json::to_string(&request) {
        Ok(frame) => {
            info!(count = channels.len(), "subscribing");
            if outbound.send(frame).await.is_err() {
                warn!("outbound channel closed, subscribe not sent");
            }
        }
        Err(e) => error!(error = %e, "failed to encode subscribe request"),
    }
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.ping_interval_ms, 5000);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let manager = ConnectionManager::new(
            ConnectionConfig::default(),
            test_dispatcher(),
            Arc::new(AckRegistry::new()),
        );

        let d1 = manager.backoff_delay(1).as_millis() as u64;
        let d4 = manager.backoff_delay(4).as_millis() as u64;
        let d20 = manager.backoff_delay(20).as_millis() as u64;

        assert!((1000..2000).contains(&d1));
        assert!((8000..9000).contains(&d4));
        assert!(d20 <= 61000); // capped at max + jitter
    }

    #[test]
    fn test_undecodable_frame_is_dropped_not_fatal() {
        let manager = ConnectionManager::new(
            ConnectionConfig::default(),
            test_dispatcher(),
            Arc::new(AckRegistry::new()),
        );

        // Garbage and a malformed-record batch both stay on this socket.
        assert!(manager.handle_frame("{this is not json").is_ok());
        assert!(manager
            .handle_frame(r#"{"table":"position","action":"update","data":[{"symbol":42}]}"#)
            .is_ok());
    }

    #[test]
    fn test_desync_recycles_the_socket() {
        let manager = ConnectionManager::new(
            ConnectionConfig::default(),
            test_dispatcher(),
            Arc::new(AckRegistry::new()),
        );

        // Deleting a level we never tracked means the mirror is stale.
        let err = manager
            .handle_frame(
                r#"{"table":"orderBookL2","action":"delete","data":[{"symbol":"ETHUSD","id":17999995000,"side":"Sell"}]}"#,
            )
            .unwrap_err();
        assert!(err.is_desync());
    }

    #[tokio::test]
    async fn test_failed_handshake_is_surfaced_and_holds_subscriptions() {
        use crate::ack::AckOutcome;
        use crate::session::{Credentials, SessionHandshake, AUTH_OP};

        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let registry = Arc::new(AckRegistry::new());
        let (sink, mut events) = EventSink::new(8);
        let handshake = Arc::new(SessionHandshake::new(
            Credentials::new("api-key", "api-secret"),
            Duration::from_secs(10),
            Duration::from_secs(5),
        ));

        let task = tokio::spawn(run_handshake(
            handshake,
            outbound_tx,
            Arc::clone(&registry),
            vec!["trade:XBTUSD".to_string()],
            sink,
        ));

        // The auth frame goes out, then the venue rejects it.
        let frame = outbound_rx.recv().await.unwrap();
        assert!(frame.contains(AUTH_OP));
        registry.resolve(AUTH_OP, AckOutcome::failure("Invalid API Key."));
        task.await.unwrap();

        match events.try_recv().unwrap() {
            FeedEvent::AuthFailed { error } => assert!(error.contains("Invalid API Key.")),
            other => panic!("expected auth failure event, got {other:?}"),
        }
        assert!(
            outbound_rx.try_recv().is_err(),
            "no subscribe after a failed handshake"
        );
    }

    fn test_dispatcher() -> Arc<Dispatcher> {
        use mex_account::PositionCache;
        use mex_book::BookEngine;

        let (sink, _rx) = EventSink::new(16);
        Arc::new(Dispatcher::new(
            Arc::new(BookEngine::new()),
            Arc::new(PositionCache::new()),
            Arc::new(AckRegistry::new()),
            sink,
        ))
    }
}
