//! livemix Capture Engine
//!
//! Drives the live compositor and keeps a rolling replay buffer of its
//! output. The render worker runs in its own thread and is controlled purely
//! by messages; clips are cut from immutable buffer snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────── control plane ─────────────┐
//! │ PipelineHandle ── Command ──┐            │
//! │      ▲                      │            │
//! │      └─ ControlEvent ──┐    │            │
//! └────────────────────────┼────┼────────────┘
//!                          │    ▼
//! ┌──────────── livemix-render thread ───────┐
//! │  FrameScheduler ─► CompositeRenderer     │
//! │        │                 │               │
//! │        ▼                 ▼               │
//! │  RollingBufferRecorder ◄─ CompositeFrame ─► preview
//! └────────┬─────────────────────────────────┘
//!          ▼ snapshot
//!     ClipExtractor ─► ClipArtifact
//! ```

pub mod clip;
pub mod control;
pub mod pipeline;
pub mod recorder;
pub mod ring;
pub mod scheduler;

pub use clip::{ClipArtifact, ClipExtractor, ClipManifest, ClipRequest};
pub use control::{Command, ControlEvent, ControlMessage};
pub use pipeline::{PipelineConfig, PipelineHandle};
pub use recorder::{
    FrameEncoder, RawRgbaEncoder, RecorderConfig, RecorderSession, RollingBufferRecorder,
};
pub use ring::{BufferSegment, BufferSnapshot, EncodedFrame, RingBuffer, StreamInfo};
pub use scheduler::{FrameScheduler, SchedulerState, TickTiming, Transition};
