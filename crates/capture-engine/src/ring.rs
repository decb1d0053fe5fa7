//! Bounded ring of recorded segments.
//!
//! Frames are appended into an open segment. When a new frame would carry the
//! open segment past `segment_len` (counting the frame's own interval), the
//! open segment is sealed first (its duration runs up to that frame, so
//! segments are contiguous) and the frame opens a new one. The open segment
//! therefore never covers more than `segment_len`. Sealed segments are immutable and shared by
//! `Arc`, so snapshots are cheap and never see later appends.
//!
//! After every append, head segments are evicted until the buffer fits the
//! retention window. Eviction is the only way segments leave the ring while
//! it is recording.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One frame's encoded payload. Independently decodable.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Offset from the session epoch.
    pub timestamp: Duration,
    pub data: Arc<[u8]>,
}

/// A time-ordered run of frames. Immutable once sealed.
#[derive(Debug, Clone)]
pub struct BufferSegment {
    pub sequence: u64,
    pub start: Duration,
    pub duration: Duration,
    pub frames: Vec<EncodedFrame>,
}

impl BufferSegment {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(|f| f.data.len()).sum()
    }
}

/// Shape of the recorded stream, carried into snapshots and clips.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Payload format tag from the encoder (e.g. `rgba8`).
    pub format: String,
}

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended {
        /// The push sealed the previous open segment.
        sealed: bool,
        /// Head segments evicted afterwards.
        evicted: usize,
    },
    /// Timestamp not after the newest buffered frame; the frame was dropped.
    OutOfOrder,
}

#[derive(Debug)]
struct OpenSegment {
    sequence: u64,
    start: Duration,
    frames: Vec<EncodedFrame>,
}

impl OpenSegment {
    fn last_timestamp(&self) -> Option<Duration> {
        self.frames.last().map(|f| f.timestamp)
    }

    /// Covered time: up to the end of the newest frame.
    fn extent(&self, frame_interval: Duration) -> Duration {
        self.last_timestamp()
            .map(|last| (last + frame_interval).saturating_sub(self.start))
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct RingBuffer {
    retention: Duration,
    segment_len: Duration,
    frame_interval: Duration,
    sealed: VecDeque<Arc<BufferSegment>>,
    /// Sum of `sealed` durations.
    sealed_duration: Duration,
    open: Option<OpenSegment>,
    next_sequence: u64,
    evicted: u64,
}

impl RingBuffer {
    /// Buffered duration stays within `retention` as long as
    /// `frame_interval <= segment_len <= retention`.
    pub fn new(retention: Duration, segment_len: Duration, frame_interval: Duration) -> Self {
        Self {
            retention,
            segment_len,
            frame_interval,
            sealed: VecDeque::new(),
            sealed_duration: Duration::ZERO,
            open: None,
            next_sequence: 0,
            evicted: 0,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Append a frame, sealing and evicting as needed.
    pub fn push(&mut self, frame: EncodedFrame) -> PushOutcome {
        if let Some(last) = self.last_timestamp() {
            if frame.timestamp <= last {
                return PushOutcome::OutOfOrder;
            }
        }

        let mut sealed = false;
        if let Some(open) = self.open.take() {
            let frame_end = frame.timestamp + self.frame_interval;
            if frame_end.saturating_sub(open.start) > self.segment_len {
                let segment = BufferSegment {
                    sequence: open.sequence,
                    start: open.start,
                    duration: frame.timestamp - open.start,
                    frames: open.frames,
                };
                tracing::trace!(
                    sequence = segment.sequence,
                    frames = segment.frames.len(),
                    "Segment sealed"
                );
                self.sealed_duration += segment.duration;
                self.sealed.push_back(Arc::new(segment));
                sealed = true;
            } else {
                self.open = Some(open);
            }
        }

        let now = frame.timestamp;
        let open = self.open.get_or_insert_with(|| {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            OpenSegment {
                sequence,
                start: frame.timestamp,
                frames: Vec::new(),
            }
        });
        open.frames.push(frame);

        let evicted = self.evict(now);
        PushOutcome::Appended { sealed, evicted }
    }

    fn evict(&mut self, now: Duration) -> usize {
        let horizon = now.checked_sub(self.retention);
        let mut evicted = 0;
        while let Some(head) = self.sealed.front() {
            let expired = horizon.is_some_and(|h| head.end() < h);
            if !expired && self.buffered_duration() <= self.retention {
                break;
            }
            if let Some(segment) = self.sealed.pop_front() {
                self.sealed_duration = self.sealed_duration.saturating_sub(segment.duration);
            }
            evicted += 1;
        }
        self.evicted += evicted as u64;
        evicted
    }

    fn last_timestamp(&self) -> Option<Duration> {
        self.open
            .as_ref()
            .and_then(OpenSegment::last_timestamp)
            .or_else(|| {
                self.sealed
                    .back()
                    .and_then(|s| s.frames.last())
                    .map(|f| f.timestamp)
            })
    }

    /// Total covered time: sealed durations plus the open segment's extent.
    pub fn buffered_duration(&self) -> Duration {
        let open = self
            .open
            .as_ref()
            .map(|o| o.extent(self.frame_interval))
            .unwrap_or_default();
        self.sealed_duration + open
    }

    /// Segments currently held, including the open one.
    pub fn segment_count(&self) -> usize {
        self.sealed.len() + usize::from(self.open.is_some())
    }

    pub fn frame_count(&self) -> usize {
        self.sealed.iter().map(|s| s.frames.len()).sum::<usize>()
            + self.open.as_ref().map_or(0, |o| o.frames.len())
    }

    pub fn byte_len(&self) -> usize {
        self.sealed.iter().map(|s| s.byte_len()).sum::<usize>()
            + self
                .open
                .as_ref()
                .map_or(0, |o| o.frames.iter().map(|f| f.data.len()).sum())
    }

    /// Segments evicted since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty() && self.open.is_none()
    }

    /// Drop every segment. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        let released = self.segment_count();
        self.sealed.clear();
        self.sealed_duration = Duration::ZERO;
        self.open = None;
        released
    }

    /// Immutable copy of the current contents. The open segment is frozen
    /// with its current extent as duration.
    pub fn snapshot(&self, info: StreamInfo) -> BufferSnapshot {
        let mut segments: Vec<Arc<BufferSegment>> = self.sealed.iter().cloned().collect();
        if let Some(open) = &self.open {
            segments.push(Arc::new(BufferSegment {
                sequence: open.sequence,
                start: open.start,
                duration: open.extent(self.frame_interval),
                frames: open.frames.clone(),
            }));
        }
        BufferSnapshot { segments, info }
    }
}

/// Point-in-time view of a ring buffer, safe to read while recording continues.
#[derive(Debug, Clone, Default)]
pub struct BufferSnapshot {
    segments: Vec<Arc<BufferSegment>>,
    info: StreamInfo,
}

impl BufferSnapshot {
    pub fn segments(&self) -> &[Arc<BufferSegment>] {
        &self.segments
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn buffered_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Start of the oldest retained segment.
    pub fn start(&self) -> Option<Duration> {
        self.segments.first().map(|s| s.start)
    }

    /// End of the newest segment.
    pub fn end(&self) -> Option<Duration> {
        self.segments.last().map(|s| s.end())
    }

    /// All frames, oldest first.
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = &EncodedFrame> + '_ {
        self.segments.iter().flat_map(|s| s.frames.iter())
    }

    pub fn frame_count(&self) -> usize {
        self.segments.iter().map(|s| s.frames.len()).sum()
    }
}
