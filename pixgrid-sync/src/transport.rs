//! WebSocket transport with fixed-delay reconnect.
//!
//! One actor task owns the connection lifecycle:
//!
//! ```text
//!            connect()                 socket open
//!  Idle ───────────────► Connecting ───────────────► Open
//!                          ▲    │                     │
//!            retry timer   │    │ connect failed      │ close / error
//!                          │    ▼                     ▼
//!                        Closed { retry_pending } ◄───┘
//!
//!  stop() from any state ──► Stopped
//! ```
//!
//! - At most one connection attempt is in flight; `connect()` while
//!   `Connecting` or `Open` does nothing.
//! - Every close schedules one reconnect after `reconnect_delay`. The
//!   [`RetryTimer`] holds a single handle; scheduling again aborts the
//!   previous timer, so closes never stack reconnects.
//! - Events from a superseded connection are discarded by connection id.
//! - Sends are best-effort: when the socket is not open the frame is
//!   dropped and counted, never queued or retried.
//! - Inbound frames reach the consumer in arrival order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How long `stop()` waits for the socket to close before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport failures. None of them are fatal to a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not running")]
    NotRunning,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, never started.
    Idle,
    Connecting,
    Open,
    /// Socket gone; a reconnect is scheduled when `retry_pending`.
    Closed { retry_pending: bool },
    /// Shut down by the client. Terminal.
    Stopped,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Events delivered to the transport's consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed,
}

// ───────────────────────────────────────────────────────────────────
// State machine
// ───────────────────────────────────────────────────────────────────

/// Pure connection state machine, keyed by connection id.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    connection_id: u64,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            connection_id: 0,
        }
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the newest connection attempt.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Start a new attempt. Returns its id, or `None` if an attempt is
    /// already in flight, the socket is open, or the machine is stopped.
    pub fn begin_connect(&mut self) -> Option<u64> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Stopped => None,
            ConnectionState::Idle | ConnectionState::Closed { .. } => {
                self.connection_id += 1;
                self.state = ConnectionState::Connecting;
                Some(self.connection_id)
            }
        }
    }

    /// The attempt `id` succeeded.
    pub fn opened(&mut self, id: u64) -> bool {
        if id != self.connection_id || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        true
    }

    /// Connection `id` closed or failed to open. Returns `true` when a
    /// reconnect should be (re)scheduled.
    pub fn closed(&mut self, id: u64) -> bool {
        if id != self.connection_id {
            return false;
        }
        match self.state {
            ConnectionState::Idle | ConnectionState::Stopped => false,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closed { .. } => {
                self.state = ConnectionState::Closed { retry_pending: true };
                true
            }
        }
    }

    /// The retry timer fired. Returns the id of the new attempt, if any.
    pub fn retry_elapsed(&mut self) -> Option<u64> {
        match self.state {
            ConnectionState::Closed { retry_pending: true } => self.begin_connect(),
            _ => None,
        }
    }

    pub fn stop(&mut self) {
        self.state = ConnectionState::Stopped;
    }
}

// ───────────────────────────────────────────────────────────────────
// Retry timer
// ───────────────────────────────────────────────────────────────────

/// A single replaceable delayed task.
#[derive(Debug, Default)]
pub struct RetryTimer {
    handle: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire` after `delay`, cancelling any timer already pending.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a timer is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ───────────────────────────────────────────────────────────────────
// Statistics
// ───────────────────────────────────────────────────────────────────

/// Point-in-time copy of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub sends_dropped: u64,
    pub reconnects_scheduled: u64,
}

#[derive(Debug, Default)]
struct AtomicTransportStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    sends_dropped: AtomicU64,
    reconnects_scheduled: AtomicU64,
}

impl AtomicTransportStats {
    fn snapshot(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ───────────────────────────────────────────────────────────────────
// Actor
// ───────────────────────────────────────────────────────────────────

enum Command {
    Connect,
    Send(String),
    Stop,
}

enum Internal {
    Opened { id: u64 },
    Frame { id: u64, text: String },
    Closed { id: u64, error: Option<TransportError> },
    RetryElapsed,
}

struct Actor {
    url: String,
    reconnect_delay: Duration,
    machine: ConnectionMachine,
    timer: RetryTimer,
    writer: Option<mpsc::Sender<String>>,
    connection: Option<JoinHandle<()>>,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<AtomicTransportStats>,
    events: mpsc::Sender<TransportEvent>,
    internal_tx: mpsc::Sender<Internal>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut internal: mpsc::Receiver<Internal>) {
        self.connect().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Connect) => self.connect().await,
                    Some(Command::Send(text)) => self.send(text),
                    Some(Command::Stop) | None => break,
                },
                Some(msg) = internal.recv() => self.handle(msg).await,
            }
        }

        self.shutdown().await;
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn connect(&mut self) {
        let Some(id) = self.machine.begin_connect() else {
            log::debug!("Connect ignored in state {:?}", self.machine.state());
            return;
        };
        self.timer.cancel();
        self.set_state(ConnectionState::Connecting).await;
        log::info!("Connecting to {} (attempt {id})", self.url);

        let (out_tx, out_rx) = mpsc::channel::<String>(256);
        self.writer = Some(out_tx);
        if let Some(previous) = self.connection.take() {
            previous.abort();
        }
        self.connection = Some(tokio::spawn(run_connection(
            id,
            self.url.clone(),
            self.internal_tx.clone(),
            out_rx,
        )));
    }

    fn send(&mut self, text: String) {
        let writer = match (self.machine.state(), &self.writer) {
            (ConnectionState::Open, Some(writer)) => writer,
            (state, _) => {
                log::debug!("Dropping send while {state:?}: {text}");
                AtomicTransportStats::bump(&self.stats.sends_dropped);
                return;
            }
        };
        match writer.try_send(text) {
            Ok(()) => AtomicTransportStats::bump(&self.stats.frames_sent),
            Err(e) => {
                log::debug!("Dropping send, writer unavailable: {e}");
                AtomicTransportStats::bump(&self.stats.sends_dropped);
            }
        }
    }

    async fn handle(&mut self, msg: Internal) {
        match msg {
            Internal::Opened { id } => {
                if !self.machine.opened(id) {
                    return;
                }
                self.set_state(ConnectionState::Open).await;
                log::info!("Connected to {}", self.url);
                self.emit(TransportEvent::Opened).await;
            }

            Internal::Frame { id, text } => {
                if id != self.machine.connection_id() || !self.machine.state().is_open() {
                    return;
                }
                AtomicTransportStats::bump(&self.stats.frames_received);
                self.emit(TransportEvent::Frame(text)).await;
            }

            Internal::Closed { id, error } => {
                let was_open = self.machine.state().is_open();
                if !self.machine.closed(id) {
                    return;
                }
                self.writer = None;
                self.connection = None;
                self.set_state(ConnectionState::Closed { retry_pending: true }).await;

                match error {
                    Some(e) => log::warn!("Connection to {} lost: {e}", self.url),
                    None => log::info!("Connection to {} closed", self.url),
                }
                if was_open {
                    self.emit(TransportEvent::Closed).await;
                }

                log::debug!("Reconnecting in {:?}", self.reconnect_delay);
                AtomicTransportStats::bump(&self.stats.reconnects_scheduled);
                let tx = self.internal_tx.clone();
                self.timer.schedule(self.reconnect_delay, async move {
                    let _ = tx.send(Internal::RetryElapsed).await;
                });
            }

            Internal::RetryElapsed => {
                if self.machine.state() == (ConnectionState::Closed { retry_pending: true }) {
                    // begin_connect() inside connect() performs the transition.
                    self.connect().await;
                }
            }
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            log::trace!("Transport consumer gone");
        }
    }

    async fn shutdown(&mut self) {
        let was_open = self.machine.state().is_open();
        self.machine.stop();
        self.timer.cancel();
        // Dropping the writer asks the connection task to close the socket.
        self.writer = None;
        if let Some(mut connection) = self.connection.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut connection).await.is_err() {
                log::warn!("Socket did not close within {CLOSE_TIMEOUT:?}; aborting");
                connection.abort();
            }
        }
        self.set_state(ConnectionState::Stopped).await;
        if was_open {
            self.emit(TransportEvent::Closed).await;
        }
        log::info!("Transport to {} stopped", self.url);
    }
}

/// Drive one socket until it closes, then report back.
async fn run_connection(
    id: u64,
    url: String,
    internal: mpsc::Sender<Internal>,
    mut outgoing: mpsc::Receiver<String>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            let _ = internal
                .send(Internal::Closed { id, error: Some(e.into()) })
                .await;
            return;
        }
    };
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    if internal.send(Internal::Opened { id }).await.is_err() {
        return;
    }

    let mut error = None;
    loop {
        tokio::select! {
            msg = ws_reader.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_owned();
                    if internal.send(Internal::Frame { id, text }).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if internal.send(Internal::Frame { id, text }).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => log::debug!("Ignoring non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error = Some(e.into());
                    break;
                }
            },
            out = outgoing.recv() => match out {
                Some(text) => {
                    if let Err(e) = ws_writer.send(Message::Text(text.into())).await {
                        error = Some(e.into());
                        break;
                    }
                }
                None => {
                    let _ = ws_writer.close().await;
                    break;
                }
            },
        }
    }

    let _ = internal.send(Internal::Closed { id, error }).await;
}

// ───────────────────────────────────────────────────────────────────
// Handle
// ───────────────────────────────────────────────────────────────────

/// Handle to the transport actor.
pub struct Transport {
    url: String,
    reconnect_delay: Duration,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<AtomicTransportStats>,
    commands: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl Transport {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            stats: Arc::new(AtomicTransportStats::default()),
            commands: None,
            task: None,
        }
    }

    /// Spawn the actor and open the first connection.
    ///
    /// Events go to `events`. Starting a running transport does nothing.
    pub fn start(&mut self, events: mpsc::Sender<TransportEvent>) {
        if self.task.is_some() {
            return;
        }
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (internal_tx, internal_rx) = mpsc::channel(256);
        let actor = Actor {
            url: self.url.clone(),
            reconnect_delay: self.reconnect_delay,
            machine: ConnectionMachine::new(),
            timer: RetryTimer::new(),
            writer: None,
            connection: None,
            state: self.state.clone(),
            stats: self.stats.clone(),
            events,
            internal_tx,
        };
        self.commands = Some(cmd_tx);
        self.task = Some(tokio::spawn(actor.run(cmd_rx, internal_rx)));
    }

    /// Connect now unless an attempt is in flight or the socket is open.
    /// A pending reconnect timer is cancelled.
    pub fn connect(&self) -> Result<(), TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::NotRunning)?;
        commands
            .try_send(Command::Connect)
            .map_err(|_| TransportError::NotRunning)
    }

    /// Best-effort send. Never blocks; frames are dropped (and logged) when
    /// the socket is not open.
    pub fn send(&self, text: impl Into<String>) {
        let text = text.into();
        let Some(commands) = self.commands.as_ref() else {
            log::debug!("Dropping send, transport not started: {text}");
            AtomicTransportStats::bump(&self.stats.sends_dropped);
            return;
        };
        if let Err(e) = commands.try_send(Command::Send(text)) {
            log::debug!("Dropping send: {e}");
            AtomicTransportStats::bump(&self.stats.sends_dropped);
        }
    }

    /// Close the socket, cancel any pending reconnect and stop the actor.
    pub async fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Stop).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Transport task ended abnormally: {e}");
            }
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
