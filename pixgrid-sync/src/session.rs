//! Grid session: the owned object a render bridge talks to.
//!
//! ```text
//!  toggle_cell ──► ToggleCooldown ──┐
//!                                   ├──► Transport ──► server
//!  move_cursor ──► Throttle ────────┘        │
//!                                            ▼ frames, in arrival order
//!                                     engine task ──► SyncState (RwLock)
//!                                            │            grid + presence
//!                                            ▼
//!                                     GridEvent channel ──► render bridge
//! ```
//!
//! The engine task is the only writer of [`SyncState`] on the socket path.
//! Readers take the read lock through [`GridSession::state`] or the
//! convenience accessors.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::codec::{self, SnapshotFormat};
use crate::config::SessionConfig;
use crate::grid::GridState;
use crate::presence::{Participant, PresenceChange, PresenceRegistry};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::throttle::{Throttle, ToggleCooldown};
use crate::transport::{ConnectionState, Transport, TransportEvent, TransportStats};

/// Change notifications for the render bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// The socket opened.
    Connected,
    /// The socket closed; remote participants and the identity have been
    /// cleared.
    Disconnected,
    IdentityAssigned(String),
    /// The whole grid was replaced.
    SnapshotApplied { cells_on: usize },
    CellChanged { cell: usize, on: bool },
    ParticipantJoined(String),
    ParticipantMoved(Participant),
    ParticipantLeft(String),
    /// Result of a viewer-count poll.
    ViewerCount(u64),
}

/// Grid and presence, mutated together by decoded frames.
#[derive(Debug)]
pub struct SyncState {
    pub grid: GridState,
    pub presence: PresenceRegistry,
}

impl SyncState {
    pub fn new(cell_count: usize) -> Self {
        Self {
            grid: GridState::new(cell_count),
            presence: PresenceRegistry::new(),
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.presence.local_id()
    }

    /// Apply one decoded frame and report what changed.
    pub fn apply(&mut self, msg: ServerMessage) -> Option<GridEvent> {
        match msg {
            ServerMessage::Identity(id) => {
                log::info!("Assigned identity {id}");
                self.presence.set_local_id(id.as_str());
                Some(GridEvent::IdentityAssigned(id))
            }
            msg @ (ServerMessage::Join(_)
            | ServerMessage::Leave(_)
            | ServerMessage::CursorMove { .. }) => {
                self.presence.handle_message(&msg).map(|change| match change {
                    PresenceChange::Joined(id) => GridEvent::ParticipantJoined(id),
                    PresenceChange::Moved(p) => GridEvent::ParticipantMoved(p),
                    PresenceChange::Left(id) => GridEvent::ParticipantLeft(id),
                })
            }
            ServerMessage::CellToggle { cell, on } => self
                .grid
                .set_cell(cell, on)
                .then_some(GridEvent::CellChanged { cell, on }),
            ServerMessage::Snapshot(bits) => {
                let expected = codec::snapshot_len(self.grid.cell_count()) * 8;
                if bits.len() < expected {
                    log::debug!(
                        "Ignoring untagged frame of {} bits, a snapshot needs {expected}",
                        bits.len()
                    );
                    return None;
                }
                self.grid.replace_all(&bits);
                Some(GridEvent::SnapshotApplied {
                    cells_on: self.grid.count_on(),
                })
            }
            ServerMessage::Unknown(_) => None,
        }
    }
}

/// One client's view of the shared grid.
pub struct GridSession {
    config: SessionConfig,
    state: Arc<RwLock<SyncState>>,
    transport: Transport,
    cursor_throttle: Throttle,
    toggle_cooldown: ToggleCooldown,
    event_tx: mpsc::Sender<GridEvent>,
    event_rx: Option<mpsc::Receiver<GridEvent>>,
    engine: Option<JoinHandle<()>>,
}

impl GridSession {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(SyncState::new(config.cell_count))),
            transport: Transport::new(config.url.clone(), config.reconnect_delay),
            cursor_throttle: Throttle::new(config.cursor_interval),
            toggle_cooldown: ToggleCooldown::new(config.toggle_cooldown),
            event_tx,
            event_rx: Some(event_rx),
            engine: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Take the change-notification receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<GridEvent>> {
        self.event_rx.take()
    }

    /// Sender half of the notification channel, for collaborators such as
    /// [`ViewerCountPoller`](crate::legacy::ViewerCountPoller).
    pub fn event_sender(&self) -> mpsc::Sender<GridEvent> {
        self.event_tx.clone()
    }

    /// Connect and start processing frames. Calling it again does nothing.
    pub fn start(&mut self) {
        if self.engine.is_some() {
            return;
        }
        let (transport_tx, transport_rx) = mpsc::channel(self.config.event_capacity.max(1));
        self.engine = Some(tokio::spawn(run_engine(
            transport_rx,
            self.state.clone(),
            self.event_tx.clone(),
            self.config.wire.snapshot,
        )));
        self.transport.start(transport_tx);
        log::info!("Grid session started for {}", self.config.url);
    }

    /// Close the socket and wait for the engine to drain.
    pub async fn stop(&mut self) {
        self.transport.stop().await;
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.await {
                log::warn!("Session engine ended abnormally: {e}");
            }
        }
        log::info!("Grid session stopped");
    }

    /// Ask the server to flip `cell`.
    ///
    /// Returns `false` if the cell is out of range or still cooling down
    /// from a previous toggle. The local grid changes only when the
    /// server's broadcast comes back.
    pub fn toggle_cell(&mut self, cell: usize) -> bool {
        if cell >= self.config.cell_count {
            log::debug!("Toggle for out-of-range cell {cell} ignored");
            return false;
        }
        if !self.toggle_cooldown.try_acquire(cell) {
            log::trace!("Cell {cell} is cooling down");
            return false;
        }
        let frame = ClientMessage::Toggle { cell }.encode(self.config.wire.toggle_tag);
        self.transport.send(frame);
        true
    }

    /// Whether the control for `cell` is locally disabled.
    pub fn is_cell_disabled(&self, cell: usize) -> bool {
        self.toggle_cooldown.is_disabled(cell)
    }

    /// Report the local cursor position.
    ///
    /// Returns `true` if the move was forwarded. Moves are dropped while the
    /// throttle window is open and before an identity has been assigned.
    pub async fn move_cursor(&mut self, x: f64, y: f64) -> bool {
        let Some(id) = self.identity().await else {
            log::trace!("Cursor move before identity assignment dropped");
            return false;
        };
        if !self.cursor_throttle.allow() {
            return false;
        }
        let frame = ClientMessage::Cursor { id, x, y }.encode(self.config.wire.toggle_tag);
        self.transport.send(frame);
        true
    }

    /// Apply a frame as if it had arrived on the socket.
    pub async fn apply(&self, msg: ServerMessage) -> Option<GridEvent> {
        let event = self.state.write().await.apply(msg);
        if let Some(event) = &event {
            notify(&self.event_tx, event.clone());
        }
        event
    }

    /// Shared state, for render bridges that want to hold the read lock.
    pub fn state(&self) -> Arc<RwLock<SyncState>> {
        self.state.clone()
    }

    pub async fn identity(&self) -> Option<String> {
        self.state.read().await.identity().map(str::to_string)
    }

    pub async fn cell(&self, index: usize) -> Option<bool> {
        self.state.read().await.grid.get(index)
    }

    pub async fn grid(&self) -> GridState {
        self.state.read().await.grid.clone()
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.state.read().await.presence.participants().cloned().collect()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.transport.state().await
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

/// Non-blocking publish; a full channel drops the event with a warning.
fn notify(events: &mpsc::Sender<GridEvent>, event: GridEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            log::warn!("Change notification dropped, receiver is behind: {event:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::trace!("Change notification dropped, receiver gone");
        }
    }
}

async fn run_engine(
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    state: Arc<RwLock<SyncState>>,
    events: mpsc::Sender<GridEvent>,
    snapshot: SnapshotFormat,
) {
    while let Some(event) = transport_rx.recv().await {
        match event {
            TransportEvent::Opened => notify(&events, GridEvent::Connected),
            TransportEvent::Frame(text) => {
                let msg = ServerMessage::parse(&text, snapshot);
                let change = state.write().await.apply(msg);
                if let Some(change) = change {
                    notify(&events, change);
                }
            }
            TransportEvent::Closed => {
                // Peers re-announce themselves and a new identity is
                // assigned after reconnect.
                state.write().await.presence.reset();
                notify(&events, GridEvent::Disconnected);
            }
        }
    }
    log::debug!("Session engine finished");
}
