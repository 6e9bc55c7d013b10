//! HTTP fallback endpoints and the viewer-count poller.
//!
//! | Endpoint | Request | Response |
//! |---|---|---|
//! | `POST /api/set` | form `cell=<index>` | `<cell>:<bit>` |
//! | `GET /api/get` | | snapshot text (hex LSB-first on old servers) |
//! | `GET /api/count` | | JSON integer |
//! | `GET /api/clients` | | JSON `[{id, ip, actionCount}]` or `null` |
//!
//! The crate ships no HTTP client. Embedders implement [`HttpFetch`] with
//! whatever client they already use; everything here is request building
//! and response parsing on top of it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{self, SnapshotFormat};
use crate::protocol::{ProtocolError, ServerMessage};
use crate::session::GridEvent;

pub const SET_PATH: &str = "/api/set";
pub const GET_PATH: &str = "/api/get";
pub const COUNT_PATH: &str = "/api/count";
pub const CLIENTS_PATH: &str = "/api/clients";

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Minimal HTTP surface the legacy endpoints need.
pub trait HttpFetch: Send + Sync + 'static {
    /// `GET path`, returning the response body.
    fn get(&self, path: &str) -> impl Future<Output = Result<String, LegacyError>> + Send;

    /// `POST path` with an `application/x-www-form-urlencoded` body.
    fn post_form(
        &self,
        path: &str,
        body: &str,
    ) -> impl Future<Output = Result<String, LegacyError>> + Send;
}

/// A connected viewer as listed by `/api/clients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerInfo {
    pub id: String,
    pub ip: String,
    #[serde(rename = "actionCount")]
    pub action_count: u64,
}

/// Form body for a toggle request.
pub fn toggle_form_body(cell: usize) -> String {
    format!("cell={cell}")
}

/// Parse the `<cell>:<bit>` answer to a toggle request.
pub fn parse_toggle_ack(body: &str) -> Result<(usize, bool), ProtocolError> {
    let body = body.trim();
    if !body.contains(':') {
        return Err(ProtocolError::MissingField("bit"));
    }
    match ServerMessage::try_parse(body, SnapshotFormat::Hex)? {
        ServerMessage::CellToggle { cell, on } => Ok((cell, on)),
        _ => Err(ProtocolError::InvalidPayload(body.to_string())),
    }
}

/// Decode a `/api/get` body into exactly `cell_count` cells.
pub fn parse_grid_body(
    body: &str,
    format: SnapshotFormat,
    cell_count: usize,
) -> Result<Vec<bool>, ProtocolError> {
    let mut bytes = format.decode_payload(body)?;
    bytes.resize(codec::snapshot_len(cell_count), 0);
    let mut bits = codec::decode_bits(&bytes, format.bit_order());
    bits.truncate(cell_count);
    Ok(bits)
}

pub fn parse_viewer_count(body: &str) -> Result<u64, LegacyError> {
    Ok(serde_json::from_str(body.trim())?)
}

/// Parse `/api/clients`. The server sends `null` when nobody is connected.
pub fn parse_viewer_list(body: &str) -> Result<Vec<ViewerInfo>, LegacyError> {
    let list: Option<Vec<ViewerInfo>> = serde_json::from_str(body.trim())?;
    Ok(list.unwrap_or_default())
}

/// The legacy endpoints over a caller-supplied [`HttpFetch`].
pub struct LegacyClient<F> {
    fetch: F,
    format: SnapshotFormat,
    cell_count: usize,
}

impl<F: HttpFetch> LegacyClient<F> {
    pub fn new(fetch: F, format: SnapshotFormat, cell_count: usize) -> Self {
        Self {
            fetch,
            format,
            cell_count,
        }
    }

    /// Toggle `cell`; returns the value the server stored.
    pub async fn toggle(&self, cell: usize) -> Result<bool, LegacyError> {
        let body = self
            .fetch
            .post_form(SET_PATH, &toggle_form_body(cell))
            .await?;
        let (acked, on) = parse_toggle_ack(&body)?;
        if acked != cell {
            log::warn!("Toggle for cell {cell} acknowledged as cell {acked}");
        }
        Ok(on)
    }

    pub async fn fetch_grid(&self) -> Result<Vec<bool>, LegacyError> {
        let body = self.fetch.get(GET_PATH).await?;
        Ok(parse_grid_body(&body, self.format, self.cell_count)?)
    }

    pub async fn viewer_count(&self) -> Result<u64, LegacyError> {
        parse_viewer_count(&self.fetch.get(COUNT_PATH).await?)
    }

    /// Connected viewers, most active first.
    pub async fn viewers(&self) -> Result<Vec<ViewerInfo>, LegacyError> {
        let mut viewers = parse_viewer_list(&self.fetch.get(CLIENTS_PATH).await?)?;
        viewers.sort_by(|a, b| b.action_count.cmp(&a.action_count));
        Ok(viewers)
    }
}

/// Polls `/api/count` and publishes [`GridEvent::ViewerCount`].
pub struct ViewerCountPoller<F> {
    fetch: F,
    interval: Duration,
}

impl<F: HttpFetch> ViewerCountPoller<F> {
    pub fn new(fetch: F, interval: Duration) -> Self {
        Self { fetch, interval }
    }

    pub async fn poll_once(&self) -> Result<u64, LegacyError> {
        parse_viewer_count(&self.fetch.get(COUNT_PATH).await?)
    }

    /// Poll immediately, then every interval, until `events` closes.
    /// Failed polls are logged and skipped.
    pub fn spawn(self, events: mpsc::Sender<GridEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.poll_once().await {
                    Ok(count) => {
                        if events.send(GridEvent::ViewerCount(count)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::debug!("Viewer count poll failed: {e}"),
                }
                if events.is_closed() {
                    break;
                }
            }
            log::debug!("Viewer count poller stopped");
        })
    }
}
