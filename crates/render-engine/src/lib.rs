//! livemix Render Engine
//!
//! Real-time compositing of many frame sources into one output canvas.
//!
//! # Frame Architecture
//!
//! ```text
//! feeds ──► SourceRegistry::refresh ──┐
//!                                     ├── CompositeRenderer::draw ──► CompositeFrame
//! Layout (resolved) ──────────────────┘         │
//!                                               ▼
//!                                        RenderTarget (canvas)
//! ```
//!
//! Each tick draws background, positioned sources, then overlays. A source
//! that is missing, pending, or broken degrades to a placeholder; it never
//! fails the frame.

pub mod blend;
pub mod compositor;
pub mod sources;
pub mod target;

pub use compositor::{CompositeRenderer, FrameOutcome, FrameReport};
pub use sources::*;
pub use target::*;
