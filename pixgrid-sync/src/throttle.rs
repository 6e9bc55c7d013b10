//! Local input rate limiting.
//!
//! - [`Throttle`]: leading-edge limiter for cursor movement. The first call
//!   of a burst goes through; calls inside the window are dropped, never
//!   delivered late.
//! - [`ToggleCooldown`]: per-cell lockout after a toggle is sent, so a
//!   double click on one cell doesn't send twice. Other cells stay live.
//!
//! Both take the current time as an argument (`*_at`) so they can be
//! driven deterministically; the plain variants read [`Instant::now`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Leading-edge throttle.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_forwarded: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_forwarded: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a call at `now` should be forwarded. Forwarding opens a new
    /// window; suppressed calls do not extend it.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_forwarded {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_forwarded = Some(now);
        true
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }
}

/// Per-cell cooldown after a toggle.
#[derive(Debug, Clone)]
pub struct ToggleCooldown {
    cooldown: Duration,
    disabled_until: HashMap<usize, Instant>,
}

impl ToggleCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            disabled_until: HashMap::new(),
        }
    }

    /// Claim `cell` at `now`. Returns `false` while the cell is still
    /// cooling down from a previous toggle.
    pub fn try_acquire_at(&mut self, cell: usize, now: Instant) -> bool {
        self.disabled_until.retain(|_, until| *until > now);
        if self.disabled_until.contains_key(&cell) {
            return false;
        }
        self.disabled_until.insert(cell, now + self.cooldown);
        true
    }

    pub fn try_acquire(&mut self, cell: usize) -> bool {
        self.try_acquire_at(cell, Instant::now())
    }

    /// Whether the control for `cell` is disabled at `now`.
    pub fn is_disabled_at(&self, cell: usize, now: Instant) -> bool {
        self.disabled_until
            .get(&cell)
            .is_some_and(|until| *until > now)
    }

    pub fn is_disabled(&self, cell: usize) -> bool {
        self.is_disabled_at(cell, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_throttle_burst() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(ms(100));
        let forwarded: Vec<u64> = [0, 30, 60, 90, 150]
            .into_iter()
            .filter(|&t| throttle.allow_at(t0 + ms(t)))
            .collect();
        assert_eq!(forwarded, vec![0, 150]);
    }

    #[test]
    fn test_throttle_window_starts_at_forwarded_call() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(ms(100));
        assert!(throttle.allow_at(t0));
        assert!(!throttle.allow_at(t0 + ms(99)));
        assert!(throttle.allow_at(t0 + ms(100)));
        assert!(!throttle.allow_at(t0 + ms(150)));
        assert!(throttle.allow_at(t0 + ms(200)));
    }

    #[test]
    fn test_throttle_first_call_always_passes() {
        let mut throttle = Throttle::new(Duration::from_secs(3600));
        assert!(throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_cooldown_blocks_same_cell_only() {
        let t0 = Instant::now();
        let mut cooldown = ToggleCooldown::new(ms(250));
        assert!(cooldown.try_acquire_at(7, t0));
        assert!(!cooldown.try_acquire_at(7, t0 + ms(100)));
        assert!(cooldown.try_acquire_at(8, t0 + ms(100)));
        assert!(cooldown.is_disabled_at(7, t0 + ms(249)));
        assert!(!cooldown.is_disabled_at(7, t0 + ms(250)));
        assert!(cooldown.try_acquire_at(7, t0 + ms(250)));
    }

    #[test]
    fn test_cooldown_unknown_cell_enabled() {
        let cooldown = ToggleCooldown::new(ms(250));
        assert!(!cooldown.is_disabled(3));
    }
}
