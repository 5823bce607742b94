//! WebSocket stream manager with heartbeat and auto-reconnect.
//!
//! Connects to one of the Amino WebSocket hosts with a signed handshake,
//! classifies inbound frames (see [`crate::events`]), and fans them out
//! through a [`tokio::sync::broadcast`] channel. Outbound control frames
//! (typing, voice) go through an `mpsc` queue owned by the connection
//! loop, so callers never touch the socket directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use mino_api::websocket::{StreamConfig, StreamManager};
//!
//! let stream = StreamManager::new(client.clone(), StreamConfig::default());
//! let mut rx = stream.subscribe();
//! stream.start()?;
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{:?}", event.name());
//! }
//!
//! stream.shutdown().await;
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::AminoClient;
use crate::error::Error;
use crate::events::{InboundEvent, classify};
use crate::models::Channel;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

const HEARTBEAT_FRAME: i64 = 116;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── ConnectionState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Terminal: shut down explicitly or out of retries.
    Closed,
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub reconnect: ReconnectConfig,
    /// Interval between `t=116` keep-alive frames. Default: 10s.
    pub heartbeat_interval: Duration,
    /// Fixed endpoint instead of a random `ws1..ws4` host.
    pub endpoint: Option<Url>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: Duration::from_secs(10),
            endpoint: None,
        }
    }
}

/// How a single connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// The manager was shut down.
    Cancelled,
    /// The server closed the socket.
    Closed,
}

// ── ControlFrame ─────────────────────────────────────────────────────

/// Fire-and-forget frames the bot can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    TypingStart { com_id: i64, chat_id: String },
    TypingStop { com_id: i64, chat_id: String, duration: Duration },
    JoinVoice { com_id: i64, chat_id: String },
    LeaveVoice { com_id: i64, chat_id: String },
    ChannelType { com_id: i64, chat_id: String, channel_type: i64 },
}

impl ControlFrame {
    /// Wire form with the given correlation id.
    pub fn to_frame(&self, id: u32) -> Value {
        match self {
            Self::TypingStart { com_id, chat_id } => json!({
                "o": {
                    "actions": ["Typing"],
                    "target": format!("ndc://x{com_id}/chat-thread/{chat_id}"),
                    "ndcId": com_id,
                    "params": { "topicIds": [], "threadType": 2 },
                    "id": id,
                },
                "t": 304,
            }),
            Self::TypingStop {
                com_id,
                chat_id,
                duration,
            } => json!({
                "o": {
                    "actions": ["Typing"],
                    "target": format!("ndc://x{com_id}/chat-thread/{chat_id}"),
                    "ndcId": com_id,
                    "params": {
                        "duration": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                        "topicIds": [],
                        "threadType": 2,
                    },
                    "id": id,
                },
                "t": 306,
            }),
            Self::JoinVoice { com_id, chat_id } => voice_frame(*com_id, chat_id, 1, id),
            Self::LeaveVoice { com_id, chat_id } => voice_frame(*com_id, chat_id, 2, id),
            Self::ChannelType {
                com_id,
                chat_id,
                channel_type,
            } => json!({
                "o": {
                    "ndcId": com_id,
                    "threadId": chat_id,
                    "channelType": channel_type,
                    "id": id,
                },
                "t": 108,
            }),
        }
    }
}

fn voice_frame(com_id: i64, chat_id: &str, join_role: i64, id: u32) -> Value {
    json!({
        "o": {
            "ndcId": com_id,
            "threadId": chat_id,
            "joinRole": join_role,
            "id": id,
        },
        "t": 112,
    })
}

fn heartbeat_frame(id: u32) -> Value {
    json!({
        "o": { "threadChannelUserInfoList": [], "id": id },
        "t": HEARTBEAT_FRAME,
    })
}

fn correlation_id() -> u32 {
    rand::thread_rng().gen_range(1..=100)
}

// ── StreamManager ────────────────────────────────────────────────────

/// Owns the WebSocket connection and its background loop.
///
/// Cheaply cloneable. [`start`](Self::start) spawns the loop once;
/// [`shutdown`](Self::shutdown) cancels it and waits for it to exit.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    client: AminoClient,
    config: StreamConfig,
    event_tx: broadcast::Sender<Arc<InboundEvent>>,
    state_tx: watch::Sender<ConnectionState>,
    outbound_tx: mpsc::Sender<Value>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Value>>>,
    cancel: CancellationToken,
    communities: Mutex<BTreeSet<i64>>,
    channel: Mutex<Option<Channel>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamManager {
    pub fn new(client: AminoClient, config: StreamConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(StreamInner {
                client,
                config,
                event_tx,
                state_tx,
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                cancel: CancellationToken::new(),
                communities: Mutex::new(BTreeSet::new()),
                channel: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the connection loop. Fails if the session is missing or the
    /// loop was already started.
    pub fn start(&self) -> Result<(), Error> {
        if !self.inner.client.is_authenticated() {
            return Err(Error::NotLoggedIn);
        }
        let outbound_rx = lock(&self.inner.outbound_rx)
            .take()
            .ok_or(Error::StreamClosed)?;

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            manager.ws_loop(outbound_rx).await;
        });
        *lock(&self.inner.task) = Some(handle);
        Ok(())
    }

    /// Get a new broadcast receiver for classified events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<InboundEvent>> {
        self.inner.event_tx.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Queue a control frame for the writer.
    pub async fn send(&self, frame: ControlFrame) -> Result<(), Error> {
        self.send_raw(frame.to_frame(correlation_id())).await
    }

    /// Queue an arbitrary JSON frame.
    pub async fn send_raw(&self, frame: Value) -> Result<(), Error> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::StreamClosed);
        }
        self.inner
            .outbound_tx
            .send(frame)
            .await
            .map_err(|_| Error::StreamClosed)
    }

    /// Queue a control frame without waiting. Fails if the queue is full.
    pub fn try_send(&self, frame: ControlFrame) -> Result<(), Error> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::StreamClosed);
        }
        self.inner
            .outbound_tx
            .try_send(frame.to_frame(correlation_id()))
            .map_err(|_| Error::StreamClosed)
    }

    /// Communities seen on inbound chat frames.
    pub fn communities(&self) -> Vec<i64> {
        lock(&self.inner.communities).iter().copied().collect()
    }

    /// The most recent live channel descriptor.
    pub fn channel(&self) -> Option<Channel> {
        lock(&self.inner.channel).clone()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state_tx.send_replace(state);
    }

    // ── Background reconnection loop ─────────────────────────────────

    /// Main loop: connect → read → backoff → reconnect.
    ///
    /// Every disconnect, clean or not, waits out the backoff before the
    /// next attempt. The attempt counter only resets after a connection
    /// that stayed up for at least one heartbeat interval.
    async fn ws_loop(&self, mut outbound_rx: mpsc::Receiver<Value>) {
        let cancel = self.inner.cancel.clone();
        let reconnect = &self.inner.config.reconnect;
        let stable_after = self.inner.config.heartbeat_interval;
        let mut attempt: u32 = 0;

        self.set_state(ConnectionState::Connecting);

        loop {
            let mut connected_at = None;
            match self.connect_and_read(&mut outbound_rx, &mut connected_at).await {
                Ok(Disconnect::Cancelled) => break,
                Ok(Disconnect::Closed) => {
                    tracing::info!(attempt, "WebSocket disconnected cleanly");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "WebSocket error");
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            if connected_at.is_some_and(|at| at.elapsed() >= stable_after) {
                attempt = 0;
            }

            if let Some(max) = reconnect.max_retries {
                if attempt >= max {
                    tracing::error!(
                        max_retries = max,
                        "WebSocket reconnection limit reached, giving up"
                    );
                    break;
                }
            }

            let delay = calculate_backoff(attempt, reconnect);
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "Waiting before reconnect"
            );

            attempt += 1;
            self.set_state(ConnectionState::Reconnecting { attempt });

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
        tracing::debug!("WebSocket loop exiting");
    }

    // ── Single connection lifecycle ──────────────────────────────────

    fn endpoint(&self) -> Result<(Url, String), Error> {
        let signbody = format!(
            "{}|{}",
            self.inner.client.device_id(),
            chrono::Utc::now().timestamp_millis()
        );
        let mut url = match self.inner.config.endpoint {
            Some(ref url) => url.clone(),
            None => {
                let host = rand::thread_rng().gen_range(1..=4);
                Url::parse(&format!("wss://ws{host}.aminoapps.com/"))?
            }
        };
        url.query_pairs_mut().append_pair("signbody", &signbody);
        Ok((url, signbody))
    }

    /// Establish a single connection and pump frames until it drops.
    ///
    /// `connected_at` is set once the handshake completes.
    async fn connect_and_read(
        &self,
        outbound_rx: &mut mpsc::Receiver<Value>,
        connected_at: &mut Option<tokio::time::Instant>,
    ) -> Result<Disconnect, Error> {
        let cancel = &self.inner.cancel;
        let client = &self.inner.client;
        let session = client.session().ok_or(Error::NotLoggedIn)?;
        let (url, signbody) = self.endpoint()?;

        tracing::info!(host = url.host_str().unwrap_or_default(), "Connecting to WebSocket");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let request = ClientRequestBuilder::new(uri)
            .with_header("NDCDEVICEID", client.device_id())
            .with_header("NDCAUTH", session.auth_header())
            .with_header("NDC-MSG-SIG", client.generator().signature(&signbody));

        let (ws_stream, _response) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Disconnect::Cancelled),
            result = tokio_tungstenite::connect_async(request) => {
                result.map_err(|e| Error::WebSocketConnect(e.to_string()))?
            }
        };

        tracing::info!("WebSocket connected");
        *connected_at = Some(tokio::time::Instant::now());
        self.set_state(ConnectionState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let period = self.inner.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let close = write.send(tungstenite::Message::Close(None));
                    if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
                        tracing::debug!("WebSocket close frame timed out");
                    }
                    return Ok(Disconnect::Cancelled);
                }
                _ = heartbeat.tick() => {
                    let frame = heartbeat_frame(correlation_id()).to_string();
                    write
                        .send(tungstenite::Message::Text(frame.into()))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                    tracing::trace!("WebSocket heartbeat");
                }
                Some(frame) = outbound_rx.recv() => {
                    write
                        .send(tungstenite::Message::Text(frame.to_string().into()))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            self.handle_text(&text);
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            tracing::trace!("WebSocket ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "WebSocket close frame received"
                                );
                            } else {
                                tracing::info!("WebSocket close frame received (no payload)");
                            }
                            return Ok(Disconnect::Closed);
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketConnect(e.to_string()));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(Disconnect::Closed);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // ── Inbound frames ───────────────────────────────────────────────

    fn handle_text(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse WebSocket frame");
                return;
            }
        };
        let own_user_id = self.inner.client.user_id();
        if let Some(event) = self.route(&value, own_user_id.as_deref()) {
            // No subscribers is fine.
            let _ = self.inner.event_tx.send(Arc::new(event));
        }
    }

    /// Classify a frame and apply the stream-level bookkeeping. Returns
    /// the event to broadcast, if any.
    fn route(&self, frame: &Value, own_user_id: Option<&str>) -> Option<InboundEvent> {
        let event = classify(frame)?;
        match event {
            InboundEvent::Channel(channel) => {
                *lock(&self.inner.channel) = Some(channel);
                None
            }
            InboundEvent::Chat { ref message, .. } => {
                if own_user_id.is_some_and(|uid| uid == message.author_id()) {
                    return None;
                }
                if message.com_id != 0 {
                    lock(&self.inner.communities).insert(message.com_id);
                }
                Some(event)
            }
            other => Some(other),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic spread seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use secrecy::SecretString;

    use super::*;
    use crate::events::EventName;
    use crate::identity::{Generator, KeyMaterial};
    use crate::session::Session;

    fn manager() -> StreamManager {
        let generator = Generator::from_material(&KeyMaterial::builtin()).unwrap();
        let client = AminoClient::with_client(
            reqwest::Client::new(),
            Url::from_str("http://127.0.0.1:1").unwrap(),
            generator,
        );
        client.install_session(Session::new(SecretString::from("sid".to_string()), "me"));
        StreamManager::new(client, StreamConfig::default())
    }

    fn chat_frame(uid: &str, com_id: i64) -> Value {
        json!({
            "t": 1000,
            "o": {
                "ndcId": com_id,
                "chatMessage": { "type": 0, "mediaType": 0, "uid": uid, "threadId": "c", "content": "hi" }
            }
        })
    }

    #[test]
    fn default_stream_config() {
        let config = StreamConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert!(config.reconnect.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();
        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };
        let d10 = calculate_backoff(10, &config);
        assert!(d10 <= Duration::from_secs(13), "{d10:?} should be capped near max_delay");
        assert!(calculate_backoff(500, &config) <= Duration::from_secs(13));
    }

    #[test]
    fn typing_frames() {
        let start = ControlFrame::TypingStart {
            com_id: 5,
            chat_id: "chat-1".into(),
        }
        .to_frame(7);
        assert_eq!(start["t"], 304);
        assert_eq!(start["o"]["target"], "ndc://x5/chat-thread/chat-1");
        assert_eq!(start["o"]["id"], 7);
        assert!(start["o"]["params"].get("duration").is_none());

        let stop = ControlFrame::TypingStop {
            com_id: 5,
            chat_id: "chat-1".into(),
            duration: Duration::from_millis(1500),
        }
        .to_frame(8);
        assert_eq!(stop["t"], 306);
        assert_eq!(stop["o"]["params"]["duration"], 1500);
    }

    #[test]
    fn voice_and_channel_frames() {
        let join = ControlFrame::JoinVoice { com_id: 1, chat_id: "c".into() }.to_frame(1);
        let leave = ControlFrame::LeaveVoice { com_id: 1, chat_id: "c".into() }.to_frame(1);
        assert_eq!((join["t"].clone(), join["o"]["joinRole"].clone()), (json!(112), json!(1)));
        assert_eq!(leave["o"]["joinRole"], 2);

        let channel = ControlFrame::ChannelType {
            com_id: 1,
            chat_id: "c".into(),
            channel_type: 5,
        }
        .to_frame(1);
        assert_eq!(channel["t"], 108);
        assert_eq!(channel["o"]["channelType"], 5);
    }

    #[test]
    fn heartbeat_shape() {
        let frame = heartbeat_frame(3);
        assert_eq!(frame["t"], 116);
        assert_eq!(frame["o"]["threadChannelUserInfoList"], json!([]));
    }

    #[test]
    fn endpoint_carries_signbody() {
        let manager = manager();
        let (url, signbody) = manager.endpoint().unwrap();
        assert!(url.host_str().unwrap().ends_with(".aminoapps.com"));
        assert!(signbody.starts_with(&manager.inner.client.device_id()));
        let query: Vec<_> = url.query_pairs().collect();
        assert_eq!(query[0].0, "signbody");
        assert_eq!(query[0].1, signbody);
    }

    #[test]
    fn own_messages_are_dropped() {
        let manager = manager();
        assert!(manager.route(&chat_frame("me", 9), Some("me")).is_none());

        let event = manager.route(&chat_frame("other", 9), Some("me")).unwrap();
        assert_eq!(event.name(), Some(EventName::TextMessage));
    }

    #[test]
    fn communities_are_tracked() {
        let manager = manager();
        manager.route(&chat_frame("a", 9), Some("me"));
        manager.route(&chat_frame("b", 0), Some("me"));
        manager.route(&chat_frame("c", 4), Some("me"));
        assert_eq!(manager.communities(), vec![4, 9]);
    }

    #[test]
    fn channel_frames_are_recorded_not_broadcast() {
        let manager = manager();
        let frame = json!({ "t": 201, "o": { "channelName": "live", "channelKey": "k" } });
        assert!(manager.route(&frame, None).is_none());
        assert_eq!(manager.channel().unwrap().channel_name.as_deref(), Some("live"));
    }

    #[test]
    fn handle_text_broadcasts_and_skips_garbage() {
        let manager = manager();
        let mut rx = manager.subscribe();

        manager.handle_text("not json at all");
        assert!(rx.try_recv().is_err());

        manager.handle_text(&chat_frame("other", 1).to_string());
        assert_eq!(rx.try_recv().unwrap().name(), Some(EventName::TextMessage));
    }

    #[tokio::test]
    async fn start_requires_session_and_runs_once() {
        let generator = Generator::from_material(&KeyMaterial::builtin()).unwrap();
        let client = AminoClient::with_client(
            reqwest::Client::new(),
            Url::from_str("http://127.0.0.1:1").unwrap(),
            generator,
        );
        let anonymous = StreamManager::new(client, StreamConfig::default());
        assert!(matches!(anonymous.start(), Err(Error::NotLoggedIn)));

        let mut config = StreamConfig::default();
        config.endpoint = Some(Url::parse("ws://127.0.0.1:1/").unwrap());
        config.reconnect.max_retries = Some(0);
        let manager = StreamManager::new(manager().inner.client.clone(), config);
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(Error::StreamClosed)));

        manager.shutdown().await;
        assert_eq!(*manager.state().borrow(), ConnectionState::Closed);
        assert!(matches!(
            manager.send(ControlFrame::JoinVoice { com_id: 1, chat_id: "c".into() }).await,
            Err(Error::StreamClosed)
        ));
    }
}
