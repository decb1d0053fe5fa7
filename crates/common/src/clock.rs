//! Clock and pacing utilities for the render loop.
//!
//! Every pipeline session is anchored to a monotonic epoch recorded at
//! `init`. Frame timestamps, buffer segment boundaries and telemetry are all
//! expressed relative to that epoch. This module provides:
//! - The session clock
//! - Millisecond conversion for telemetry
//! - A frame pacer that decides whether a tick is due

use std::time::{Duration, Instant};

/// A session clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the pipeline was initialized).
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the session started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SessionClock {
    /// Create a new session clock anchored to now.
    pub fn start() -> Self {
        Self::from_epoch(Instant::now())
    }

    /// Create a clock anchored to a known instant.
    pub fn from_epoch(epoch: Instant) -> Self {
        Self {
            epoch,
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Offset of `instant` from the epoch. Instants before the epoch map to zero.
    pub fn offset_of(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.epoch)
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Convert a duration to fractional milliseconds (for telemetry).
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Frame pacer for the render loop.
///
/// Never fires more than once per interval; when called late it fires once
/// and re-anchors on the current time instead of catching up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl FramePacer {
    /// Create a pacer targeting the given frame rate. `fps` of zero is treated as 1.
    pub fn new(fps: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / fps.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last.saturating_add(self.target_interval_ns) => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Nanoseconds since the last accepted tick, if any.
    pub fn since_last_ns(&self, current_ns: u64) -> Option<u64> {
        self.last_tick_ns
            .map(|last| current_ns.saturating_sub(last))
    }

    /// Forget the last tick so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }

    /// Target interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.target_interval_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_epoch_is_rfc3339() {
        let clock = SessionClock::start();
        assert!(chrono::DateTime::parse_from_rfc3339(clock.epoch_wall()).is_ok());
        assert!(clock.offset_of(Instant::now()) < Duration::from_secs(1));
    }

    #[test]
    fn test_duration_ms() {
        assert!((duration_ms(Duration::from_micros(1500)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_offset_before_epoch_is_zero() {
        let before = Instant::now();
        let clock = SessionClock::from_epoch(before + Duration::from_millis(5));
        assert_eq!(clock.offset_of(before), Duration::ZERO);
    }

    #[test]
    fn test_frame_pacer() {
        let mut pacer = FramePacer::new(60);
        assert!(pacer.should_tick(0)); // first tick always fires
        assert!(!pacer.should_tick(1_000_000)); // 1ms later, too soon
        assert!(pacer.should_tick(17_000_000)); // ~17ms later (60Hz ~ 16.67ms)
        assert_eq!(pacer.since_last_ns(20_000_000), Some(3_000_000));
    }

    #[test]
    fn test_frame_pacer_does_not_catch_up() {
        let mut pacer = FramePacer::new(30);
        assert!(pacer.should_tick(0));
        // A 200ms stall yields a single tick, not a burst.
        assert!(pacer.should_tick(200_000_000));
        assert!(!pacer.should_tick(210_000_000));
        assert!(pacer.should_tick(233_400_000));
    }

    #[test]
    fn test_frame_pacer_zero_fps_is_clamped() {
        let pacer = FramePacer::new(0);
        assert_eq!(pacer.interval(), Duration::from_secs(1));
    }
}
