use std::time::Duration;

use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::{Instant, interval_at};

/// How often the local position estimate advances while playing
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Display-ready view of a player's position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionSnapshot {
    /// Estimated position in microseconds
    pub position_us: i64,
    /// Track length in microseconds, 0 when unknown
    pub length_us: i64,
    /// `elapsed / total` label
    pub label: String,
    /// Position as a fraction of the length, clamped to `0.0..=1.0`
    pub fraction: f64,
    /// Whether a position can be shown at all
    pub visible: bool,
}

/// Interpolates playback position between authoritative updates.
///
/// Owns at most one periodic ticker. The ticker only wakes the owner through
/// the `on_tick` callback; the owner then calls [`PositionTracker::tick`] on
/// its own loop, so position is never mutated off the dispatcher. Every
/// ticker gets a new generation, and ticks carry the generation that sent
/// them.
#[derive(Debug)]
pub struct PositionTracker {
    position_us: i64,
    length_us: i64,
    interval: Duration,
    ticker: Option<AbortHandle>,
    generation: u64,
}

impl PositionTracker {
    /// Create a stopped tracker ticking every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            position_us: 0,
            length_us: 0,
            interval,
            ticker: None,
            generation: 0,
        }
    }

    /// Start ticking, unless already running.
    ///
    /// `on_tick` fires once per interval, first one interval from now, with
    /// the generation of this ticker.
    pub fn start<F>(&mut self, on_tick: F)
    where
        F: Fn(u64) + Send + 'static,
    {
        if self.is_running() {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                on_tick(generation);
            }
        });
        self.ticker = Some(handle.abort_handle());
    }

    /// Stop ticking, keeping the position
    pub fn pause(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Stop ticking and rewind to zero
    pub fn stop(&mut self) {
        self.pause();
        self.position_us = 0;
    }

    /// Whether the ticker is active
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Advance by one interval.
    ///
    /// Returns `false` and leaves the position untouched unless the tick
    /// comes from the running ticker; others were already in flight when
    /// it was paused or replaced.
    pub fn tick(&mut self, generation: u64) -> bool {
        if !self.is_running() || generation != self.generation {
            return false;
        }
        let step = i64::try_from(self.interval.as_micros()).unwrap_or(i64::MAX);
        self.position_us = self.position_us.saturating_add(step);
        true
    }

    /// Overwrite the estimate with an authoritative position
    pub fn set_position(&mut self, position_us: i64) {
        self.position_us = position_us.max(0);
    }

    /// Rewind for a new track of the given length
    pub fn reset_track(&mut self, length_us: i64) {
        self.position_us = 0;
        self.length_us = length_us.max(0);
    }

    /// Current estimate in microseconds
    pub fn position_us(&self) -> i64 {
        self.position_us
    }

    /// Current track length in microseconds
    pub fn length_us(&self) -> i64 {
        self.length_us
    }

    /// Display-ready view of the current estimate
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> PositionSnapshot {
        let visible = self.length_us > 0;
        let fraction = if visible {
            (self.position_us as f64 / self.length_us as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        PositionSnapshot {
            position_us: self.position_us,
            length_us: self.length_us,
            label: format!(
                "{} / {}",
                format_time(self.position_us),
                format_time(self.length_us)
            ),
            fraction,
            visible,
        }
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.pause();
    }
}

/// Format microseconds as `m:ss`, or `h:mm:ss` from one hour on.
pub fn format_time(micros: i64) -> String {
    let total_secs = micros.max(0) / 1_000_000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
