//! Rolling buffer recorder.
//!
//! Consumes composed frames on the render thread and keeps the last
//! `retention` seconds of output in a [`RingBuffer`]. The recorder handle is
//! cheap to clone; the control plane holds a clone to read buffered duration
//! and take snapshots while the render thread keeps appending.
//!
//! Encoding happens under its own lock, which only the appending thread
//! takes. The ring lock is held just long enough to push, so readers never
//! wait on an encode.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use livemix_common::config::BufferConfig;
use livemix_common::error::{LivemixError, LivemixResult};
use livemix_render_engine::target::CompositeFrame;

use crate::ring::{BufferSnapshot, EncodedFrame, PushOutcome, RingBuffer, StreamInfo};

/// Turns composed frames into buffer payloads.
///
/// Every encoded frame must be decodable on its own; clips may start at any
/// frame.
pub trait FrameEncoder: Send {
    /// Short format tag recorded in clip manifests.
    fn format(&self) -> &str;

    fn encode(&mut self, frame: &CompositeFrame) -> LivemixResult<Arc<[u8]>>;
}

/// Stores raw RGBA8 pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRgbaEncoder;

impl FrameEncoder for RawRgbaEncoder {
    fn format(&self) -> &str {
        "rgba8"
    }

    fn encode(&mut self, frame: &CompositeFrame) -> LivemixResult<Arc<[u8]>> {
        Ok(Arc::from(frame.as_bytes()))
    }
}

/// Recorder settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderConfig {
    pub retention: Duration,
    pub segment_len: Duration,
    pub fps: u32,
}

impl RecorderConfig {
    /// Build from the buffer section of the app config and the output rate.
    pub fn from_buffer(buffer: &BufferConfig, fps: u32) -> LivemixResult<Self> {
        buffer.validate()?;
        if fps == 0 {
            return Err(LivemixError::config("recorder fps must be positive"));
        }
        let config = Self {
            retention: Duration::from_secs_f64(buffer.retention_secs),
            segment_len: Duration::from_secs_f64(buffer.segment_secs),
            fps,
        };
        config.check_frame_fits()?;
        Ok(config)
    }

    /// A segment must be able to hold at least one frame.
    fn check_frame_fits(&self) -> LivemixResult<()> {
        if self.frame_interval() > self.segment_len {
            return Err(LivemixError::config(format!(
                "one frame at {} fps is longer than the {:.3}s segment",
                self.fps,
                self.segment_len.as_secs_f64()
            )));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }
}

/// Identifies one recording run. Returned by [`RollingBufferRecorder::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSession {
    pub id: u64,
}

struct ActiveSession {
    id: u64,
    ring: RingBuffer,
    width: u32,
    height: u32,
    dropped: u64,
}

struct RecorderInner {
    config: RecorderConfig,
    session: Option<ActiveSession>,
    next_session: u64,
}

#[derive(Clone)]
pub struct RollingBufferRecorder {
    inner: Arc<Mutex<RecorderInner>>,
    encoder: Arc<Mutex<Box<dyn FrameEncoder>>>,
    format: Arc<str>,
}

impl RollingBufferRecorder {
    /// A recorder storing raw RGBA frames.
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_encoder(config, Box::new(RawRgbaEncoder))
    }

    pub fn with_encoder(config: RecorderConfig, encoder: Box<dyn FrameEncoder>) -> Self {
        let format = Arc::from(encoder.format());
        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                config,
                session: None,
                next_session: 1,
            })),
            encoder: Arc::new(Mutex::new(encoder)),
            format,
        }
    }

    // A panic while holding the lock leaves the ring consistent (every
    // mutation is a single push/pop), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RecorderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Payload format tag of the configured encoder.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn config(&self) -> RecorderConfig {
        self.lock().config
    }

    /// Output rate for the next session. A running session keeps its rate.
    ///
    /// Rejected when one frame at `fps` would not fit in a segment.
    pub fn set_fps(&self, fps: u32) -> LivemixResult<()> {
        let mut inner = self.lock();
        let config = RecorderConfig {
            fps: fps.max(1),
            ..inner.config
        };
        config.check_frame_fits()?;
        inner.config = config;
        Ok(())
    }

    /// Begin buffering. If already active, returns the running session.
    pub fn start(&self) -> RecorderSession {
        let mut inner = self.lock();
        if let Some(active) = &inner.session {
            tracing::debug!(session = active.id, "Recorder already active");
            return RecorderSession { id: active.id };
        }
        let id = inner.next_session;
        inner.next_session += 1;
        let config = inner.config;
        inner.session = Some(ActiveSession {
            id,
            ring: RingBuffer::new(config.retention, config.segment_len, config.frame_interval()),
            width: 0,
            height: 0,
            dropped: 0,
        });
        tracing::info!(
            session = id,
            retention_secs = config.retention.as_secs_f64(),
            segment_secs = config.segment_len.as_secs_f64(),
            "Recorder started"
        );
        RecorderSession { id }
    }

    pub fn is_active(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Append a frame. Ignored while inactive; out-of-order frames are dropped.
    pub fn on_frame(&self, frame: &CompositeFrame, timestamp: Duration) -> LivemixResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        let data = self
            .encoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encode(frame)?;

        let mut inner = self.lock();
        // stopped while encoding
        let Some(session) = inner.session.as_mut() else {
            return Ok(());
        };
        session.width = frame.width;
        session.height = frame.height;
        match session.ring.push(EncodedFrame { timestamp, data }) {
            PushOutcome::Appended { evicted, .. } => {
                if evicted > 0 {
                    tracing::trace!(evicted, "Evicted buffer segments");
                }
            }
            PushOutcome::OutOfOrder => {
                session.dropped += 1;
                tracing::warn!(
                    sequence = frame.sequence,
                    timestamp_ms = timestamp.as_secs_f64() * 1000.0,
                    "Dropping out-of-order frame"
                );
            }
        }
        Ok(())
    }

    /// Seconds of output currently buffered.
    pub fn buffered_duration(&self) -> Duration {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.ring.buffered_duration())
            .unwrap_or_default()
    }

    /// Immutable view of the buffer as of now. Empty when inactive.
    pub fn snapshot(&self) -> BufferSnapshot {
        let inner = self.lock();
        match &inner.session {
            Some(session) => session.ring.snapshot(StreamInfo {
                width: session.width,
                height: session.height,
                fps: inner.config.fps,
                format: self.format.to_string(),
            }),
            None => BufferSnapshot::default(),
        }
    }

    /// Frames dropped for arriving out of order in the current session.
    pub fn dropped_frames(&self) -> u64 {
        self.lock().session.as_ref().map_or(0, |s| s.dropped)
    }

    /// Stop buffering and release every segment. Returns whether a session
    /// was active.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        match inner.session.take() {
            Some(mut session) => {
                let released = session.ring.clear();
                tracing::info!(session = session.id, released, "Recorder stopped");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for RollingBufferRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("RollingBufferRecorder")
            .field("config", &inner.config)
            .field("format", &self.format)
            .field("active", &inner.session.as_ref().map(|s| s.id))
            .finish()
    }
}
