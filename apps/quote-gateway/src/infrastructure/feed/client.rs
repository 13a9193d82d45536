//! Feed Bridge Client
//!
//! Holds the single WebSocket session to the upstream feed bridge and
//! implements [`FeedAdapter`] on top of it.
//!
//! # Session lifecycle
//!
//! 1. Connect and send the `auth` command.
//! 2. On the auth ack, replay every held subscription, then open the
//!    command path to callers.
//! 3. Correlate command replies by id, forward pushes to the dispatcher and
//!    ping on an interval.
//! 4. On loss, fail in-flight commands and reconnect with backoff.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::codec::{CodecError, JsonCodec};
use super::messages::{BridgeMessage, Command, CommandFrame, ErrorMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::FeedState;
use crate::application::ports::{CandlePeriod, Channel, FeedAdapter, FeedError};
use crate::application::services::DispatchHandle;
use crate::domain::subscription::Symbol;
use crate::infrastructure::config::{Credentials, FeedSettings};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a feed session ends.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Bridge refused the credentials.
    #[error("authentication failed ({code}): {message}")]
    AuthenticationFailed {
        /// Upstream error code.
        code: i64,
        /// Upstream error message.
        message: String,
    },

    /// No auth reply in time.
    #[error("authentication timed out after {0:?}")]
    AuthenticationTimeout(Duration),

    /// Connection closed by the bridge.
    #[error("connection closed")]
    ConnectionClosed,

    /// Reconnect budget spent.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Bridge WebSocket URL.
    pub url: String,
    /// Upstream credentials.
    pub credentials: Credentials,
    /// Time allowed for a command reply, also used for auth.
    pub command_timeout: Duration,
    /// WebSocket ping interval.
    pub ping_interval: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Build from feed settings.
    #[must_use]
    pub fn from_settings(settings: &FeedSettings, credentials: Credentials) -> Self {
        Self {
            url: settings.url.clone(),
            credentials,
            command_timeout: settings.command_timeout,
            ping_interval: settings.ping_interval,
            reconnect: ReconnectConfig::from(settings),
        }
    }
}

// =============================================================================
// Held Subscriptions
// =============================================================================

/// Subscriptions the bridge has acknowledged, replayed after reconnect.
#[derive(Debug, Default)]
struct HeldSubscriptions {
    channels: BTreeMap<Symbol, BTreeSet<Channel>>,
    candles: BTreeSet<(Symbol, CandlePeriod)>,
}

impl HeldSubscriptions {
    fn add_channels(&mut self, symbols: &[Symbol], channels: &[Channel]) {
        for symbol in symbols {
            self.channels
                .entry(symbol.clone())
                .or_default()
                .extend(channels.iter().copied());
        }
    }

    fn remove_channels(&mut self, symbols: &[Symbol], channels: &[Channel]) {
        for symbol in symbols {
            if let Some(held) = self.channels.get_mut(symbol) {
                for channel in channels {
                    held.remove(channel);
                }
                if held.is_empty() {
                    self.channels.remove(symbol);
                }
            }
        }
    }

    /// One subscribe per distinct channel set, then one per candle.
    fn restore_commands(&self) -> Vec<Command> {
        let mut by_channels: BTreeMap<Vec<Channel>, Vec<Symbol>> = BTreeMap::new();
        for (symbol, channels) in &self.channels {
            by_channels
                .entry(channels.iter().copied().collect())
                .or_default()
                .push(symbol.clone());
        }

        let mut commands: Vec<Command> = by_channels
            .into_iter()
            .map(|(channels, symbols)| Command::Subscribe { symbols, channels })
            .collect();
        commands.extend(self.candles.iter().map(|(symbol, period)| {
            Command::SubscribeCandlesticks {
                symbol: symbol.clone(),
                period: *period,
            }
        }));
        commands
    }
}

// =============================================================================
// Feed Client
// =============================================================================

type Reply = oneshot::Sender<Result<(), FeedError>>;

/// Per-connection bookkeeping.
struct Session {
    auth_id: u64,
    authenticated: bool,
    sender: Option<mpsc::UnboundedSender<Message>>,
}

/// WebSocket client for the upstream feed bridge.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: JsonCodec,
    dispatch: DispatchHandle,
    cancel: CancellationToken,
    state: Arc<FeedState>,
    next_id: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<u64, Reply>>,
    held: RwLock<HeldSubscriptions>,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.config.url)
            .field("connected", &self.state.is_connected())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Create a new feed client. Nothing connects until [`FeedClient::run`].
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        dispatch: DispatchHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            dispatch,
            cancel,
            state: Arc::new(FeedState::new()),
            next_id: AtomicU64::new(1),
            outbound: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            held: RwLock::new(HeldSubscriptions::default()),
        }
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::MaxReconnectAttemptsExceeded`] once the
    /// reconnect budget is spent.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                info!("Feed client cancelled");
                return Ok(());
            }

            match self.session(&mut policy).await {
                Ok(()) => {
                    info!("Feed client stopped");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Feed session ended");

                    let Some(delay) = policy.next_delay() else {
                        error!(
                            attempts = policy.attempts(),
                            "Giving up on feed bridge reconnection"
                        );
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded(
                            policy.max_attempts(),
                        ));
                    };

                    let attempt = policy.attempts();
                    self.state.record_reconnect_attempt(attempt);
                    metrics::record_reconnect();
                    info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed bridge"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            info!("Feed client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One connection, from connect to loss or cancellation.
    async fn session(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        let result = self.drive(policy).await;
        let reason = result
            .as_ref()
            .err()
            .map_or_else(|| "shutdown".to_string(), ToString::to_string);
        self.teardown(&reason);
        result
    }

    async fn drive(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        info!(url = %self.config.url, "Connecting to feed bridge");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let auth = CommandFrame {
            id: self.next_id(),
            command: Command::auth(&self.config.credentials),
        };
        write
            .send(Message::Text(self.codec.encode(&auth)?.into()))
            .await?;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let mut session = Session {
            auth_id: auth.id,
            authenticated: false,
            sender: Some(out_tx),
        };

        let auth_deadline = tokio::time::sleep(self.config.command_timeout);
        tokio::pin!(auth_deadline);

        let period = self.config.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = &mut auth_deadline, if !session.authenticated => {
                    return Err(FeedClientError::AuthenticationTimeout(self.config.command_timeout));
                }
                _ = ping.tick(), if session.authenticated => {
                    write.send(Message::Ping(Vec::new().into())).await?;
                }
                Some(outgoing) = out_rx.recv() => {
                    write.send(outgoing).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &mut session, policy)?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "Feed bridge sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("Feed bridge stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    fn handle_text(
        &self,
        text: &str,
        session: &mut Session,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable feed frame");
                return Ok(());
            }
        };

        for message in messages {
            match message {
                BridgeMessage::Ack(ack) if !session.authenticated && ack.id == session.auth_id => {
                    session.authenticated = true;
                    policy.reset();
                    if let Some(sender) = session.sender.take() {
                        self.open_command_path(sender);
                    }
                }
                BridgeMessage::Ack(ack) => self.resolve(ack.id, Ok(())),
                BridgeMessage::Error(err)
                    if !session.authenticated && err.id == Some(session.auth_id) =>
                {
                    return Err(FeedClientError::AuthenticationFailed {
                        code: err.code,
                        message: err.message,
                    });
                }
                BridgeMessage::Error(ErrorMessage {
                    id: Some(id),
                    code,
                    message,
                }) => self.resolve(id, Err(FeedError::Rejected { code, message })),
                BridgeMessage::Error(ErrorMessage {
                    id: None,
                    code,
                    message,
                }) => {
                    warn!(code, message = %message, "Feed bridge reported an error");
                }
                BridgeMessage::Push(push) => {
                    self.state.record_push();
                    self.dispatch.on_push(&push.symbol, &push.event);
                }
            }
        }

        Ok(())
    }

    /// Replay held subscriptions, then accept caller commands.
    fn open_command_path(&self, sender: mpsc::UnboundedSender<Message>) {
        self.state.mark_connected();

        let restore = self.held.read().restore_commands();
        if !restore.is_empty() {
            info!(commands = restore.len(), "Restoring upstream subscriptions");
        }
        for command in restore {
            let frame = CommandFrame {
                id: self.next_id(),
                command,
            };
            match self.codec.encode(&frame) {
                Ok(text) => {
                    let _ = sender.send(Message::Text(text.into()));
                }
                Err(e) => warn!(error = %e, "Failed to encode restore command"),
            }
        }

        *self.outbound.lock() = Some(sender);
        info!(url = %self.config.url, "Feed session authenticated");
    }

    fn resolve(&self, id: u64, result: Result<(), FeedError>) {
        let reply = self.pending.lock().remove(&id);
        match (reply, result) {
            (Some(reply), result) => {
                let _ = reply.send(result);
            }
            (None, Err(e)) => warn!(id, error = %e, "Untracked command failed"),
            (None, Ok(())) => trace!(id, "Untracked command acknowledged"),
        }
    }

    fn teardown(&self, reason: &str) {
        self.outbound.lock().take();
        self.state.mark_disconnected(reason);

        let pending: Vec<Reply> = self.pending.lock().drain().map(|(_, reply)| reply).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Failing in-flight commands");
        }
        for reply in pending {
            let _ = reply.send(Err(FeedError::Transport("connection lost".to_string())));
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one command and wait for its reply.
    async fn command(&self, command: Command) -> Result<(), FeedError> {
        let action = command.action();
        let frame = CommandFrame {
            id: self.next_id(),
            command,
        };
        let text = self
            .codec
            .encode(&frame)
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let outbound = self.outbound.lock();
            let Some(sender) = outbound.as_ref() else {
                return Err(FeedError::NotConnected);
            };
            self.pending.lock().insert(frame.id, reply_tx);
            if sender.send(Message::Text(text.into())).is_err() {
                self.pending.lock().remove(&frame.id);
                return Err(FeedError::NotConnected);
            }
        }
        debug!(id = frame.id, action, "Sent feed command");

        match tokio::time::timeout(self.config.command_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FeedError::Transport("reply channel dropped".to_string())),
            Err(_) => {
                self.pending.lock().remove(&frame.id);
                Err(FeedError::Timeout(self.config.command_timeout))
            }
        }
    }
}

#[async_trait]
impl FeedAdapter for FeedClient {
    async fn subscribe_channels(
        &self,
        symbols: &[Symbol],
        channels: &[Channel],
    ) -> Result<(), FeedError> {
        self.command(Command::Subscribe {
            symbols: symbols.to_vec(),
            channels: channels.to_vec(),
        })
        .await?;
        self.held.write().add_channels(symbols, channels);
        Ok(())
    }

    async fn unsubscribe_channels(
        &self,
        symbols: &[Symbol],
        channels: &[Channel],
    ) -> Result<(), FeedError> {
        self.command(Command::Unsubscribe {
            symbols: symbols.to_vec(),
            channels: channels.to_vec(),
        })
        .await?;
        self.held.write().remove_channels(symbols, channels);
        Ok(())
    }

    async fn subscribe_candles(&self, symbol: &str, period: CandlePeriod) -> Result<(), FeedError> {
        self.command(Command::SubscribeCandlesticks {
            symbol: symbol.to_string(),
            period,
        })
        .await?;
        self.held.write().candles.insert((symbol.to_string(), period));
        Ok(())
    }

    async fn unsubscribe_candles(
        &self,
        symbol: &str,
        period: CandlePeriod,
    ) -> Result<(), FeedError> {
        self.command(Command::UnsubscribeCandlesticks {
            symbol: symbol.to_string(),
            period,
        })
        .await?;
        self.held
            .write()
            .candles
            .remove(&(symbol.to_string(), period));
        Ok(())
    }
}
