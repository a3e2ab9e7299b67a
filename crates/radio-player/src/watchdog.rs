//! Stuck-stream watchdog.
//!
//! Some broken streams neither error nor visibly buffer: the element sits
//! in a playing state while the position stops moving.  The watchdog samples
//! the playback position on a fixed interval and reports "stuck" once no
//! meaningful advance has been seen for long enough.
//!
//! Pure bookkeeping over injected instants; the session coordinator owns the
//! sampling timer.

use std::time::Duration;

use radio_types::config::PlayerConfig;
use tokio::time::Instant;

pub struct Watchdog {
    /// Minimum position delta that counts as progress, in seconds.
    min_advance: f64,
    /// How long the position may sit still before the stream is stuck.
    stuck_after: Duration,
    last_position: Option<f64>,
    last_advance: Instant,
}

impl Watchdog {
    pub fn from_config(cfg: &PlayerConfig, now: Instant) -> Self {
        Self {
            min_advance: cfg.watchdog_min_advance_secs,
            stuck_after: Duration::from_secs(cfg.watchdog_stuck_secs),
            last_position: None,
            last_advance: now,
        }
    }

    /// Call on every successful transition into playing.
    pub fn reset(&mut self, now: Instant) {
        self.last_position = None;
        self.last_advance = now;
    }

    /// Feed one position sample.  Returns true when the stream counts as
    /// stuck.  A `None` position (no timeline yet) is "not advancing": a
    /// stream that never starts is caught by the same clock.
    pub fn observe(&mut self, position: Option<f64>, now: Instant) -> bool {
        let advanced = match (self.last_position, position) {
            (Some(prev), Some(cur)) => (cur - prev).abs() >= self.min_advance,
            // First sample with a real position counts as progress so a
            // fresh session gets the full window.
            (None, Some(_)) => true,
            _ => false,
        };

        if let Some(cur) = position {
            self.last_position = Some(cur);
        }

        if advanced {
            self.last_advance = now;
            return false;
        }

        now.duration_since(self.last_advance) >= self.stuck_after
    }
}
