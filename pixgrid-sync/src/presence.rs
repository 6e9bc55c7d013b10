//! Presence registry: who else is looking at the grid, and where their
//! cursor is.
//!
//! ```text
//! r:<id>          ──► join()    insert if absent
//! p:<id>:<x>:<y>  ──► upsert()  create or move
//! d:<id>          ──► remove()  no-op when absent
//! ```
//!
//! A cursor move from an id we never saw join creates the participant, so
//! a missed join heals itself on the next move. Frames about the local
//! identity are ignored; the local user never shows up as a remote peer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::ServerMessage;

/// A remote viewer and its last reported cursor position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Participant {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }
}

/// What a presence frame did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Joined(String),
    Moved(Participant),
    Left(String),
}

/// In-memory set of remote participants, keyed by id.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Our own identity, once the server has assigned it.
    local_id: Option<String>,
    participants: HashMap<String, Participant>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identity assigned to this session.
    ///
    /// Drops any entry already stored under that id.
    pub fn set_local_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.participants.remove(&id);
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_id.as_deref() == Some(id)
    }

    /// Insert a participant at the origin if it is not already known.
    ///
    /// Returns `true` if the participant was new.
    pub fn join(&mut self, id: &str) -> bool {
        if self.is_local(id) || self.participants.contains_key(id) {
            return false;
        }
        self.participants
            .insert(id.to_string(), Participant::new(id, 0.0, 0.0));
        true
    }

    /// Create the participant if absent, otherwise move it.
    ///
    /// Returns `true` if the participant was created.
    pub fn upsert(&mut self, id: &str, x: f64, y: f64) -> bool {
        if self.is_local(id) {
            return false;
        }
        match self.participants.get_mut(id) {
            Some(p) => {
                p.x = x;
                p.y = y;
                false
            }
            None => {
                self.participants
                    .insert(id.to_string(), Participant::new(id, x, y));
                true
            }
        }
    }

    /// Remove a participant. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        self.participants.remove(id).is_some()
    }

    pub fn has(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// All known participants, in no particular order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Forget every remote participant and the local identity.
    ///
    /// Identities are per connection; the server assigns a new one after
    /// reconnect.
    pub fn reset(&mut self) {
        self.participants.clear();
        self.local_id = None;
    }

    /// Apply a decoded frame. Non-presence frames are ignored.
    pub fn handle_message(&mut self, msg: &ServerMessage) -> Option<PresenceChange> {
        match msg {
            ServerMessage::Join(id) => self.join(id).then(|| PresenceChange::Joined(id.clone())),
            ServerMessage::Leave(id) => self.remove(id).then(|| PresenceChange::Left(id.clone())),
            ServerMessage::CursorMove { id, x, y } => {
                if self.is_local(id) {
                    log::trace!("Ignoring echo of local cursor");
                    return None;
                }
                self.upsert(id, *x, *y);
                Some(PresenceChange::Moved(Participant::new(id.as_str(), *x, *y)))
            }
            _ => None,
        }
    }
}
