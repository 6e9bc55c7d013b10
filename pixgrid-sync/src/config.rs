//! Session configuration.
//!
//! Defaults match the deployed grid: 25×25 cells, base64 snapshots,
//! `s:` toggles, 1 s reconnect delay, 100 ms cursor throttle, 250 ms
//! toggle cooldown and a 10 s viewer-count poll.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::codec::SnapshotFormat;
use crate::protocol::{ToggleTag, WireFormat};

/// 25×25 grid.
pub const DEFAULT_CELL_COUNT: usize = 625;

/// Configuration for a [`GridSession`](crate::session::GridSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:6060/api/ws`.
    pub url: String,
    /// Number of cells in the grid.
    pub cell_count: usize,
    /// Wire conventions (toggle tag, snapshot encoding).
    pub wire: WireFormat,
    /// Delay before reconnecting after the socket closes.
    pub reconnect_delay: Duration,
    /// Minimum interval between forwarded cursor updates.
    pub cursor_interval: Duration,
    /// How long a cell stays disabled after the local user toggles it.
    pub toggle_cooldown: Duration,
    /// Interval between viewer-count polls.
    pub viewer_poll_interval: Duration,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:6060/api/ws".to_string(),
            cell_count: DEFAULT_CELL_COUNT,
            wire: WireFormat::default(),
            reconnect_delay: Duration::from_millis(1000),
            cursor_interval: Duration::from_millis(100),
            toggle_cooldown: Duration::from_millis(250),
            viewer_poll_interval: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Default configuration pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `GRID_*` environment variables.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `GRID_URL` | socket endpoint |
    /// | `GRID_SIZE` | cell count |
    /// | `GRID_SNAPSHOT` | `base64` or `hex` |
    /// | `GRID_TOGGLE_TAG` | `s` or `set` |
    /// | `GRID_RECONNECT_MS` | reconnect delay |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("GRID_URL") {
            config.url = url;
        }
        if let Some(size) = parsed(&lookup, "GRID_SIZE") {
            config.cell_count = size;
        }
        if let Some(raw) = lookup("GRID_SNAPSHOT") {
            match raw.to_ascii_lowercase().as_str() {
                "base64" => config.wire.snapshot = SnapshotFormat::Base64,
                "hex" => config.wire.snapshot = SnapshotFormat::Hex,
                other => log::warn!("GRID_SNAPSHOT={other:?} not recognized, using default"),
            }
        }
        if let Some(raw) = lookup("GRID_TOGGLE_TAG") {
            match raw.as_str() {
                "s" => config.wire.toggle_tag = ToggleTag::Short,
                "set" => config.wire.toggle_tag = ToggleTag::Legacy,
                other => log::warn!("GRID_TOGGLE_TAG={other:?} not recognized, using default"),
            }
        }
        if let Some(ms) = parsed::<u64>(&lookup, "GRID_RECONNECT_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }

        config
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("{key}={raw:?} is not a valid number, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.cell_count, 625);
        assert_eq!(config.wire.toggle_tag, ToggleTag::Short);
        assert_eq!(config.wire.snapshot, SnapshotFormat::Base64);
        assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.cursor_interval, Duration::from_millis(100));
        assert_eq!(config.toggle_cooldown, Duration::from_millis(250));
        assert_eq!(config.viewer_poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("GRID_URL", "ws://grid.example:9000/api/ws"),
            ("GRID_SIZE", "100"),
            ("GRID_SNAPSHOT", "HEX"),
            ("GRID_TOGGLE_TAG", "set"),
            ("GRID_RECONNECT_MS", "250"),
        ]));
        assert_eq!(config.url, "ws://grid.example:9000/api/ws");
        assert_eq!(config.cell_count, 100);
        assert_eq!(config.wire.snapshot, SnapshotFormat::Hex);
        assert_eq!(config.wire.toggle_tag, ToggleTag::Legacy);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("GRID_SIZE", "lots"),
            ("GRID_SNAPSHOT", "gzip"),
            ("GRID_TOGGLE_TAG", "toggle"),
        ]));
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_with_url() {
        let config = SessionConfig::with_url("ws://localhost:1");
        assert_eq!(config.url, "ws://localhost:1");
        assert_eq!(config.cell_count, DEFAULT_CELL_COUNT);
    }
}
