//! Text wire protocol.
//!
//! Every frame is UTF-8 text. Tagged frames are `<tag>:<field>[:<field>…]`;
//! an untagged frame is a full grid snapshot.
//!
//! ```text
//! server → client                    client → server
//! ───────────────────────────        ─────────────────────
//! c:<id>            identity         s:<cell>    toggle (current)
//! r:<id>            peer joined      set:<cell>  toggle (legacy)
//! d:<id>            peer left        p:<id>:<x>:<y>  cursor
//! p:<id>:<x>:<y>    cursor moved
//! s:<cell>:<0|1>    cell toggled     (set:<cell>:<0|1> also accepted)
//! <base64 | hex>    full snapshot
//! ```
//!
//! Decoding is two-level: [`ServerMessage::try_parse`] reports why a frame
//! was rejected, [`ServerMessage::parse`] folds every rejection into
//! [`ServerMessage::Unknown`] so the session never stops on a bad frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, SnapshotFormat};

/// Reasons a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid snapshot payload: {0}")]
    InvalidPayload(String),
}

/// Tag used for outgoing toggle intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleTag {
    /// `s:<cell>`
    #[default]
    Short,
    /// `set:<cell>`
    Legacy,
}

impl ToggleTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ToggleTag::Short => "s",
            ToggleTag::Legacy => "set",
        }
    }
}

/// Wire conventions a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireFormat {
    pub toggle_tag: ToggleTag,
    pub snapshot: SnapshotFormat,
}

// ───────────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────────

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Identity assigned to this session.
    Identity(String),
    /// A remote participant connected.
    Join(String),
    /// A remote participant disconnected.
    Leave(String),
    /// A remote cursor moved.
    CursorMove { id: String, x: f64, y: f64 },
    /// A single cell changed.
    CellToggle { cell: usize, on: bool },
    /// Authoritative grid contents, `bytes * 8` bits long.
    Snapshot(Vec<bool>),
    /// Anything else; carries the raw frame.
    Unknown(String),
}

impl ServerMessage {
    /// Decode one frame, reporting why it was rejected.
    pub fn try_parse(frame: &str, snapshot: SnapshotFormat) -> Result<Self, ProtocolError> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let Some((tag, rest)) = frame.split_once(':') else {
            return codec::decode_snapshot(frame, snapshot).and_then(|bits| {
                if bits.is_empty() {
                    Err(ProtocolError::InvalidPayload("zero-length snapshot".into()))
                } else {
                    Ok(ServerMessage::Snapshot(bits))
                }
            });
        };

        match tag {
            "c" => Ok(ServerMessage::Identity(required(rest, "id")?)),
            "r" | "j" | "join" => Ok(ServerMessage::Join(required(rest, "id")?)),
            "d" => Ok(ServerMessage::Leave(required(rest, "id")?)),
            "p" => {
                let (id, x, y) = parse_cursor(rest)?;
                Ok(ServerMessage::CursorMove { id, x, y })
            }
            "s" | "set" => parse_toggle(rest),
            // Pre-socket broadcasts carried no tag at all: `<cell>:<bit>`.
            t if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) => parse_toggle(frame),
            t => Err(ProtocolError::UnknownTag(t.to_string())),
        }
    }

    /// Decode one frame; undecodable frames become [`ServerMessage::Unknown`].
    pub fn parse(frame: &str, snapshot: SnapshotFormat) -> Self {
        match Self::try_parse(frame, snapshot) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring frame {frame:?}: {e}");
                ServerMessage::Unknown(frame.to_string())
            }
        }
    }

    /// Render this message as a server would send it.
    pub fn encode(&self, snapshot: SnapshotFormat) -> String {
        match self {
            ServerMessage::Identity(id) => format!("c:{id}"),
            ServerMessage::Join(id) => format!("r:{id}"),
            ServerMessage::Leave(id) => format!("d:{id}"),
            ServerMessage::CursorMove { id, x, y } => format!("p:{id}:{x}:{y}"),
            ServerMessage::CellToggle { cell, on } => format!("s:{cell}:{}", u8::from(*on)),
            ServerMessage::Snapshot(bits) => codec::encode_snapshot(bits, snapshot),
            ServerMessage::Unknown(raw) => raw.clone(),
        }
    }
}

fn required(field: &str, name: &'static str) -> Result<String, ProtocolError> {
    if field.is_empty() {
        Err(ProtocolError::MissingField(name))
    } else {
        Ok(field.to_string())
    }
}

fn number<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// `<id>:<x>:<y>`; the id is everything before the last two fields.
fn parse_cursor(rest: &str) -> Result<(String, f64, f64), ProtocolError> {
    let mut fields = rest.rsplitn(3, ':');
    let y = fields.next().ok_or(ProtocolError::MissingField("y"))?;
    let x = fields.next().ok_or(ProtocolError::MissingField("x"))?;
    let id = fields.next().ok_or(ProtocolError::MissingField("id"))?;
    Ok((required(id, "id")?, coordinate(x, "x")?, coordinate(y, "y")?))
}

/// A finite coordinate; `NaN` and infinities are rejected.
fn coordinate(value: &str, field: &'static str) -> Result<f64, ProtocolError> {
    let v: f64 = number(value, field)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ProtocolError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }
}

/// `<cell>:<0|1>`
fn parse_toggle(rest: &str) -> Result<ServerMessage, ProtocolError> {
    let (cell, checked) = rest
        .split_once(':')
        .ok_or(ProtocolError::MissingField("checked"))?;
    let on = match checked {
        "1" => true,
        "0" => false,
        other => {
            return Err(ProtocolError::InvalidNumber {
                field: "checked",
                value: other.to_string(),
            })
        }
    };
    Ok(ServerMessage::CellToggle {
        cell: number(cell, "cell")?,
        on,
    })
}

// ───────────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────────

/// An intent sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Flip one cell; the server answers with the resulting value.
    Toggle { cell: usize },
    /// Local cursor position, tagged with the assigned identity.
    Cursor { id: String, x: f64, y: f64 },
}

impl ClientMessage {
    pub fn encode(&self, tag: ToggleTag) -> String {
        match self {
            ClientMessage::Toggle { cell } => format!("{}:{cell}", tag.as_str()),
            ClientMessage::Cursor { id, x, y } => format!("p:{id}:{x}:{y}"),
        }
    }

    /// Decode a client frame (used by servers and test harnesses).
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let frame = frame.trim();
        let (tag, rest) = frame.split_once(':').ok_or(ProtocolError::Empty)?;
        match tag {
            "s" | "set" => Ok(ClientMessage::Toggle {
                cell: number(rest, "cell")?,
            }),
            "p" => {
                let (id, x, y) = parse_cursor(rest)?;
                Ok(ClientMessage::Cursor { id, x, y })
            }
            t => Err(ProtocolError::UnknownTag(t.to_string())),
        }
    }
}
