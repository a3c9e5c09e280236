//! [`StreamingClient`]: tokio driver for [`StreamSession`].
//!
//! The driver owns the socket task and both timers. Every socket and timer
//! task holds a [`Weak`] back-reference plus the generation it was started
//! for; events from an older generation are dropped, so a superseded socket
//! can never move the current session. Subscriber callbacks always run
//! after the driver lock is released.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use orderwire_core::protocol::{MISSING_TOKEN_REASON, PING, close_code};
use orderwire_core::{CredentialStore, RelayError};

use crate::config::StreamConfig;
use crate::machine::{ConnectionState, Effect, Event, StreamSession};
use crate::message::{Inbound, StatusMessage, parse_inbound};
use crate::registry::{SubscriberRegistry, Subscription};

enum Command {
    Send(String),
    Close,
}

enum Notice {
    Connection(bool),
    Error(RelayError),
}

struct Driver {
    session: StreamSession,
    generation: u64,
    socket: Option<mpsc::UnboundedSender<Command>>,
    ping: Option<AbortHandle>,
    reconnect: Option<AbortHandle>,
}

impl Driver {
    fn stop_ping(&mut self) {
        if let Some(handle) = self.ping.take() {
            handle.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            let _ = socket.send(Command::Close);
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop_ping();
        self.cancel_reconnect();
        self.close_socket();
    }
}

struct Inner {
    config: StreamConfig,
    credentials: CredentialStore,
    driver: Mutex<Driver>,
    status: SubscriberRegistry<StatusMessage>,
    errors: SubscriberRegistry<RelayError>,
    connection: SubscriberRegistry<bool>,
}

/// Reconnecting client for the order-update stream.
///
/// Reads the access token from the shared [`CredentialStore`] on every
/// connect and reconnect. Must be used from within a tokio runtime.
/// Dropping the client cancels its timers and closes the socket.
pub struct StreamingClient {
    inner: Arc<Inner>,
}

impl StreamingClient {
    /// Idle client.
    pub fn new(config: StreamConfig, credentials: CredentialStore) -> Self {
        let session = StreamSession::new(config.max_reconnect_attempts);
        Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                driver: Mutex::new(Driver {
                    session,
                    generation: 0,
                    socket: None,
                    ping: None,
                    reconnect: None,
                }),
                status: SubscriberRegistry::new(),
                errors: SubscriberRegistry::new(),
                connection: SubscriberRegistry::new(),
            }),
        }
    }

    /// Open the stream. No-op while open or connecting.
    ///
    /// Without an access token, error subscribers receive
    /// [`RelayError::Unauthorized`] and nothing is attempted.
    pub fn connect(&self) {
        let token = self.inner.credentials.access_token();
        let event = Event::Connect {
            has_token: token.is_some(),
        };
        self.inner.apply(event, token.as_deref(), None);
    }

    /// Close the stream and cancel any pending reconnect.
    ///
    /// Timers are cancelled before this returns; the socket finishes its
    /// close handshake in the background.
    pub fn disconnect(&self) {
        self.inner.apply(Event::Disconnect, None, None);
    }

    /// Subscribe to order-status updates.
    pub fn on_status(
        &self,
        callback: impl Fn(&StatusMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.status.subscribe(callback)
    }

    /// Subscribe to errors: a missing token or reconnect exhaustion.
    pub fn on_error(&self, callback: impl Fn(&RelayError) + Send + Sync + 'static) -> Subscription {
        self.inner.errors.subscribe(callback)
    }

    /// Subscribe to connection changes.
    pub fn on_connection(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        self.inner
            .connection
            .subscribe(move |connected: &bool| callback(*connected))
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.driver.lock().session.state()
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.driver.lock().session.reconnect_attempts()
    }
}

impl Inner {
    /// Feed `event` to the session, run the effects, then notify.
    ///
    /// `generation` is set for events raised by socket and timer tasks.
    fn apply(self: &Arc<Self>, event: Event, token: Option<&str>, generation: Option<u64>) {
        let notices = {
            let mut driver = self.driver.lock();
            if generation.is_some_and(|g| g != driver.generation) {
                debug!(?event, "ignoring event from superseded socket");
                return;
            }
            let before = driver.session.state();
            let effects = driver.session.handle(event);
            let after = driver.session.state();
            if before != after {
                debug!(
                    from = ?before,
                    to = ?after,
                    attempts = driver.session.reconnect_attempts(),
                    "stream state changed"
                );
            }
            self.execute(&mut driver, effects, token)
        };

        for notice in notices {
            match notice {
                Notice::Connection(connected) => {
                    let _ = self.connection.dispatch(&connected);
                }
                Notice::Error(error) => {
                    warn!(code = error.code(), error = %error, "order stream error");
                    let _ = self.errors.dispatch(&error);
                }
            }
        }
    }

    fn execute(
        self: &Arc<Self>,
        driver: &mut Driver,
        effects: Vec<Effect>,
        token: Option<&str>,
    ) -> Vec<Notice> {
        let mut notices = Vec::new();
        for effect in effects {
            match effect {
                Effect::OpenSocket => {
                    let Some(token) = token else {
                        warn!("open requested without a token");
                        continue;
                    };
                    driver.close_socket();
                    driver.reconnect = None;
                    driver.generation += 1;
                    let (commands, receiver) = mpsc::unbounded_channel();
                    driver.socket = Some(commands);
                    let _ = tokio::spawn(run_socket(
                        Arc::downgrade(self),
                        driver.generation,
                        self.config.stream_url(token),
                        receiver,
                        self.config.close_timeout,
                    ));
                }
                Effect::CloseSocket => driver.close_socket(),
                Effect::StartPing => {
                    driver.stop_ping();
                    driver.ping = Some(self.spawn_ping(driver.generation));
                }
                Effect::StopPing => driver.stop_ping(),
                Effect::ScheduleReconnect => {
                    driver.cancel_reconnect();
                    driver.reconnect = Some(self.spawn_reconnect(driver.generation));
                }
                Effect::CancelReconnect => driver.cancel_reconnect(),
                Effect::NotifyConnection(connected) => {
                    notices.push(Notice::Connection(connected));
                }
                Effect::NotifyError(error) => notices.push(Notice::Error(error)),
            }
        }
        notices
    }

    fn spawn_ping(self: &Arc<Self>, generation: u64) -> AbortHandle {
        let weak = Arc::downgrade(self);
        let period = self.config.ping_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                let _ = ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.send(generation, PING) {
                    break;
                }
            }
        })
        .abort_handle()
    }

    fn spawn_reconnect(self: &Arc<Self>, generation: u64) -> AbortHandle {
        let weak = Arc::downgrade(self);
        let delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let token = inner.credentials.access_token();
                let event = Event::ReconnectDue {
                    has_token: token.is_some(),
                };
                inner.apply(event, token.as_deref(), Some(generation));
            }
        })
        .abort_handle()
    }

    /// Queue `text` on the socket of `generation`.
    fn send(&self, generation: u64, text: &str) -> bool {
        let driver = self.driver.lock();
        driver.generation == generation
            && driver
                .socket
                .as_ref()
                .is_some_and(|socket| socket.send(Command::Send(text.to_owned())).is_ok())
    }

    fn is_current(&self, generation: u64) -> bool {
        let driver = self.driver.lock();
        driver.generation == generation && driver.session.state() == ConnectionState::Open
    }

    fn deliver(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        match parse_inbound(text) {
            Inbound::Pong => debug!(generation, "keepalive acknowledged"),
            Inbound::Confirmation => info!(generation, "order stream confirmed"),
            Inbound::Status(message) => {
                let _ = self.status.dispatch(&message);
            }
            Inbound::Malformed(reason) => {
                warn!(generation, %reason, "dropping malformed stream frame");
            }
        }
    }
}

/// Whether the bridge closed the socket because the upgrade had no token.
///
/// Upstream policy closes relayed by the bridge reconnect like any other
/// close.
fn is_missing_token_close(frame: &CloseFrame) -> bool {
    u16::from(frame.code) == close_code::POLICY && frame.reason.as_str() == MISSING_TOKEN_REASON
}

fn report(inner: &Weak<Inner>, generation: u64, event: Event) {
    if let Some(inner) = inner.upgrade() {
        inner.apply(event, None, Some(generation));
    }
}

/// One socket's lifetime: handshake, read loop, close.
async fn run_socket(
    inner: Weak<Inner>,
    generation: u64,
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    close_timeout: Duration,
) {
    debug!(generation, "opening order stream");
    let connecting = connect_async(url);
    tokio::pin!(connecting);

    let socket = tokio::select! {
        result = &mut connecting => match result {
            Ok((socket, _response)) => socket,
            Err(e) => {
                debug!(generation, error = %e, "order stream connect failed");
                report(&inner, generation, Event::Closed);
                return;
            }
        },
        _ = commands.recv() => {
            debug!(generation, "order stream connect abandoned");
            report(&inner, generation, Event::Closed);
            return;
        }
    };

    info!(generation, "order stream open");
    report(&inner, generation, Event::Opened);
    let (mut sink, mut stream) = socket.split();

    let outcome = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        debug!(generation, error = %e, "order stream send failed");
                        break Event::Closed;
                    }
                }
                Some(Command::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::from(close_code::NORMAL),
                        reason: "client disconnect".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let drain = async { while let Some(Ok(_)) = stream.next().await {} };
                    let _ = tokio::time::timeout(close_timeout, drain).await;
                    break Event::Closed;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.deliver(generation, text.as_str());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(
                        generation,
                        code = ?frame.as_ref().map(|f| u16::from(f.code)),
                        "order stream closed by server"
                    );
                    let _ = sink.close().await;
                    break match frame {
                        Some(frame) if is_missing_token_close(&frame) => Event::Rejected {
                            reason: frame.reason.to_string(),
                        },
                        _ => Event::Closed,
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(generation, error = %e, "order stream errored");
                    break Event::Closed;
                }
                None => break Event::Closed,
            }
        }
    };

    report(&inner, generation, outcome);
}
