//! # pixgrid-sync: client engine for a shared pixel grid
//!
//! Many viewers toggle cells of one boolean grid and watch each other's
//! cursors. This crate speaks the text protocol, mirrors the grid and
//! presence locally, and survives connection loss.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  intents   ┌─────────────┐   text frames   ┌────────┐
//! │ Render bridge│ ─────────► │ GridSession │ ◄─────────────► │ server │
//! │ (embedder)   │ ◄───────── │             │   WebSocket     └────────┘
//! └──────────────┘ GridEvent  └──────┬──────┘
//!                                    │
//!                   ┌────────────────┼────────────────┐
//!                   ▼                ▼                ▼
//!             ┌──────────┐    ┌─────────────┐   ┌───────────┐
//!             │ Transport│    │ GridState   │   │ Presence  │
//!             │ reconnect│    │ (bits)      │   │ Registry  │
//!             └──────────┘    └─────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: bit packing and snapshot text encodings
//! - [`protocol`]: frame decoder and encoder
//! - [`presence`]: remote participants and cursors
//! - [`grid`]: local grid mirror
//! - [`throttle`]: cursor throttle and per-cell toggle cooldown
//! - [`transport`]: WebSocket connection with fixed-delay reconnect
//! - [`session`]: the owned session tying it together
//! - [`config`]: session configuration and `GRID_*` environment overrides
//! - [`legacy`]: HTTP fallback endpoints and viewer-count polling

pub mod codec;
pub mod config;
pub mod grid;
pub mod legacy;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod throttle;
pub mod transport;

// Re-exports for convenience
pub use codec::{decode_bits, decode_snapshot, encode_bits, encode_snapshot, BitOrder, SnapshotFormat};
pub use config::{SessionConfig, DEFAULT_CELL_COUNT};
pub use grid::GridState;
pub use legacy::{HttpFetch, LegacyClient, LegacyError, ViewerCountPoller, ViewerInfo};
pub use presence::{Participant, PresenceChange, PresenceRegistry};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, ToggleTag, WireFormat};
pub use session::{GridEvent, GridSession, SyncState};
pub use throttle::{Throttle, ToggleCooldown};
pub use transport::{
    ConnectionMachine, ConnectionState, RetryTimer, Transport, TransportError, TransportEvent,
    TransportStats,
};
