//! Frame scheduling.
//!
//! The scheduler decides whether a wakeup becomes a rendered frame. It is
//! driven from outside (the render worker's interval timer) and never sleeps
//! itself, so it can be tested with synthetic instants.

use std::time::{Duration, Instant};

use livemix_common::clock::{duration_ms, FramePacer, SessionClock};

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet ticking.
    Idle,
    /// Issuing ticks.
    Running,
    /// Terminal.
    Stopped,
}

/// Result of a state transition request.
///
/// Starting a running scheduler or stopping a stopped one is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    NoOp,
}

/// Timing for an accepted tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTiming {
    /// 1-based frame number within the session.
    pub sequence: u64,
    /// Offset of the tick from the session epoch.
    pub timestamp: Duration,
    /// Time since the previous rendered frame; `None` for the first.
    pub since_last: Option<Duration>,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    fps: u32,
    pacer: FramePacer,
    clock: Option<SessionClock>,
    sequence: u64,
    skipped: u64,
    slow_frames: u64,
}

impl FrameScheduler {
    pub fn new(fps: u32) -> Self {
        Self {
            state: SchedulerState::Idle,
            fps,
            pacer: FramePacer::new(fps),
            clock: None,
            sequence: 0,
            skipped: 0,
            slow_frames: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Nominal frame interval (`1000 / fps` ms).
    pub fn interval(&self) -> Duration {
        self.pacer.interval()
    }

    /// Session clock, available once started.
    pub fn clock(&self) -> Option<&SessionClock> {
        self.clock.as_ref()
    }

    /// Begin issuing ticks, with `epoch` as time zero for frame timestamps.
    pub fn start(&mut self, epoch: Instant) -> Transition {
        match self.state {
            SchedulerState::Idle => {
                self.clock = Some(SessionClock::from_epoch(epoch));
                self.pacer.reset();
                self.state = SchedulerState::Running;
                tracing::info!(fps = self.fps, "Frame scheduler started");
                Transition::Applied
            }
            SchedulerState::Running => Transition::NoOp,
            SchedulerState::Stopped => {
                tracing::debug!("Ignoring start on a stopped scheduler");
                Transition::NoOp
            }
        }
    }

    /// Stop issuing ticks. Terminal.
    pub fn stop(&mut self) -> Transition {
        if self.state == SchedulerState::Stopped {
            return Transition::NoOp;
        }
        tracing::info!(
            rendered = self.sequence,
            skipped = self.skipped,
            slow = self.slow_frames,
            "Frame scheduler stopped"
        );
        self.state = SchedulerState::Stopped;
        Transition::Applied
    }

    /// Decide whether the wakeup at `now` renders a frame.
    ///
    /// Returns `None` when not running or when less than one frame interval
    /// has passed since the previous rendered frame (counted as skipped).
    pub fn poll_tick(&mut self, now: Instant) -> Option<TickTiming> {
        if self.state != SchedulerState::Running {
            return None;
        }
        let clock = self.clock.as_ref()?;
        let timestamp = clock.offset_of(now);
        let now_ns = timestamp.as_nanos() as u64;
        let since_last = self.pacer.since_last_ns(now_ns).map(Duration::from_nanos);

        if !self.pacer.should_tick(now_ns) {
            self.skipped += 1;
            tracing::trace!(skipped = self.skipped, "Tick skipped");
            return None;
        }
        self.sequence += 1;
        Some(TickTiming {
            sequence: self.sequence,
            timestamp,
            since_last,
        })
    }

    /// Record how long the frame for `tick` took to render.
    pub fn finish_tick(&mut self, tick: &TickTiming, render_duration: Duration) {
        if render_duration > self.interval() {
            self.slow_frames += 1;
            tracing::debug!(
                sequence = tick.sequence,
                frame_ms = duration_ms(render_duration),
                budget_ms = duration_ms(self.interval()),
                "Frame over budget"
            );
        }
    }

    /// Frames rendered so far.
    pub fn rendered(&self) -> u64 {
        self.sequence
    }

    /// Wakeups that did not render because they came too early.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Frames whose render time exceeded the frame interval.
    pub fn slow_frames(&self) -> u64 {
        self.slow_frames
    }
}
