//! livemix Layout Model
//!
//! Defines the data contracts shared by the control plane and the renderer:
//! - **Geometry:** canvas-space rectangles and colors
//! - **Sources:** drawable inputs and their readiness
//! - **Layout:** raw (as sent by the UI) and resolved (bounds-safe) layouts
//! - **Engine:** the pure resolver from one to the other
//!
//! All coordinates are integer pixels in the output canvas once resolved.

pub mod engine;
pub mod geometry;
pub mod layout;
pub mod source;

pub use engine::*;
pub use geometry::*;
pub use layout::*;
pub use source::*;
