//! Render target and composed frames.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use livemix_common::config::validate_canvas;
use livemix_common::error::LivemixResult;

/// The drawable output surface. Owned exclusively by the render worker.
#[derive(Debug)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    fps: u32,
    canvas: RgbaImage,
}

impl RenderTarget {
    /// Allocate a target. Fails with `RenderTargetUnavailable` for empty,
    /// oversized, or zero-fps targets.
    pub fn new(width: u32, height: u32, fps: u32) -> LivemixResult<Self> {
        validate_canvas(width, height, fps)?;
        tracing::debug!(width, height, fps, "Allocating render target");
        Ok(Self {
            width,
            height,
            fps,
            canvas: RgbaImage::new(width, height),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Nominal duration of one frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub(crate) fn canvas_mut(&mut self) -> &mut RgbaImage {
        &mut self.canvas
    }

    /// Copy the current canvas out as an immutable frame.
    pub fn snapshot(&self, sequence: u64, timestamp: Duration) -> CompositeFrame {
        CompositeFrame {
            sequence,
            timestamp,
            width: self.width,
            height: self.height,
            pixels: Arc::new(self.canvas.clone()),
        }
    }
}

/// The composed output of one tick.
///
/// Pixels are shared between the live preview and the recorder.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    /// Monotonic frame counter within the session.
    pub sequence: u64,
    /// Offset from the session epoch.
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<RgbaImage>,
}

impl CompositeFrame {
    /// Raw RGBA8 bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livemix_common::error::LivemixError;

    #[test]
    fn rejects_unusable_targets() {
        let err = RenderTarget::new(0, 720, 30).unwrap_err();
        assert!(matches!(err, LivemixError::RenderTargetUnavailable { .. }));
        assert!(RenderTarget::new(1280, 720, 0).is_err());
    }

    #[test]
    fn snapshot_is_independent_of_later_draws() {
        let mut target = RenderTarget::new(2, 2, 30).unwrap();
        let frame = target.snapshot(1, Duration::from_millis(33));
        target.canvas_mut().put_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
        assert_eq!(frame.pixels.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(frame.as_bytes().len(), 16);
        assert_eq!(target.frame_interval(), Duration::from_nanos(33_333_333));
    }
}
