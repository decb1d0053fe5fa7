//! Frame compositor: combines background, positioned sources, and overlays.
//!
//! Draw order is fixed:
//! 1. background (solid color, or a source scaled to fill the canvas)
//! 2. positioned sources in paint order, each masked by its shape; anything
//!    not ready is replaced by a placeholder fill
//! 3. overlays in paint order, skipped while not ready
//!
//! A source that fails to decode never aborts the frame: the failure is
//! logged, recorded in the [`FrameReport`], and drawing continues.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use livemix_common::error::{LivemixError, LivemixResult};
use livemix_layout_model::geometry::{Color, Rect};
use livemix_layout_model::layout::{BackgroundRef, Layout, Shape};
use livemix_layout_model::source::SourceId;

use crate::blend::{blit_shape, fill, fill_shape};
use crate::sources::{Bitmap, SourceRegistry, SourceState};
use crate::target::{CompositeFrame, RenderTarget};

/// Per-frame drawing statistics.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Layers drawn from a ready bitmap.
    pub drawn: usize,
    /// Positions painted with the placeholder fill.
    pub placeholders: usize,
    /// Background/overlay layers left out because their source was not ready.
    pub skipped: usize,
    /// Per-source failures (`SourceDecodeFailure`) seen while drawing.
    pub failures: Vec<LivemixError>,
}

/// A drawn frame and how it went.
#[derive(Debug)]
pub struct FrameOutcome {
    pub frame: CompositeFrame,
    pub report: FrameReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Placeholder,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScaleKey {
    source: SourceId,
    width: u32,
    height: u32,
}

struct ScaledEntry {
    origin: Bitmap,
    image: RgbaImage,
    last_used: u64,
}

/// Draws composite frames. Keeps scaled copies of unchanged bitmaps between
/// frames so still images are not rescaled every tick.
pub struct CompositeRenderer {
    placeholder: Color,
    scaled: HashMap<ScaleKey, ScaledEntry>,
    generation: u64,
}

impl CompositeRenderer {
    pub fn new() -> Self {
        Self::with_placeholder(Color::PLACEHOLDER)
    }

    pub fn with_placeholder(placeholder: Color) -> Self {
        Self {
            placeholder,
            scaled: HashMap::new(),
            generation: 0,
        }
    }

    /// Draw one frame of `layout` into `target` using the sources as of their
    /// last refresh.
    ///
    /// Only fails if the layout was resolved for a different canvas size.
    pub fn draw(
        &mut self,
        target: &mut RenderTarget,
        layout: &Layout,
        sources: &SourceRegistry,
        sequence: u64,
        timestamp: Duration,
    ) -> LivemixResult<FrameOutcome> {
        let (width, height) = (target.width(), target.height());
        if layout.canvas_width() != width || layout.canvas_height() != height {
            return Err(LivemixError::render(format!(
                "layout resolved for {}x{} cannot draw into a {width}x{height} target",
                layout.canvas_width(),
                layout.canvas_height()
            )));
        }

        self.generation += 1;
        let mut report = FrameReport::default();
        let canvas = target.canvas_mut();

        match layout.background() {
            BackgroundRef::Color { color } => fill(canvas, *color),
            BackgroundRef::Source { source_id } => {
                fill(canvas, Color::BLACK);
                self.paint_source(
                    canvas,
                    source_id,
                    Rect::full(width, height),
                    Shape::Rectangle,
                    Fallback::Skip,
                    sources,
                    &mut report,
                );
            }
        }

        for position in layout.positions() {
            self.paint_source(
                canvas,
                &position.source_id,
                position.rect,
                position.shape,
                Fallback::Placeholder,
                sources,
                &mut report,
            );
        }

        for overlay in layout.overlays() {
            self.paint_source(
                canvas,
                &overlay.source_id,
                overlay.target_rect(width, height),
                Shape::Rectangle,
                Fallback::Skip,
                sources,
                &mut report,
            );
        }

        let generation = self.generation;
        self.scaled.retain(|_, entry| entry.last_used == generation);

        Ok(FrameOutcome {
            frame: target.snapshot(sequence, timestamp),
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_source(
        &mut self,
        canvas: &mut RgbaImage,
        id: &SourceId,
        rect: Rect,
        shape: Shape,
        fallback: Fallback,
        sources: &SourceRegistry,
        report: &mut FrameReport,
    ) {
        let failure = match sources.lookup(id) {
            SourceState::Ready(bitmap) => match self.scaled(id, bitmap, rect.width, rect.height) {
                Ok(image) => {
                    blit_shape(canvas, image, rect, shape);
                    report.drawn += 1;
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        source = %id,
                        error = %e,
                        "Drawing placeholder for undecodable source"
                    );
                    Some(e)
                }
            },
            SourceState::Failed(reason) => Some(LivemixError::source_decode(id.as_str(), reason)),
            SourceState::Pending | SourceState::Missing => None,
        };

        if let Some(e) = failure {
            report.failures.push(e);
        }
        match fallback {
            Fallback::Placeholder => {
                fill_shape(canvas, rect, shape, self.placeholder);
                report.placeholders += 1;
            }
            Fallback::Skip => report.skipped += 1,
        }
    }

    fn scaled<'a>(
        &'a mut self,
        id: &SourceId,
        bitmap: &'a Bitmap,
        width: u32,
        height: u32,
    ) -> LivemixResult<&'a RgbaImage> {
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(LivemixError::source_decode(
                id.as_str(),
                format!("bitmap has no pixels ({}x{})", bitmap.width(), bitmap.height()),
            ));
        }
        if bitmap.width() == width && bitmap.height() == height {
            return Ok(bitmap.image());
        }

        let generation = self.generation;
        let key = ScaleKey {
            source: id.clone(),
            width,
            height,
        };
        let entry = match self.scaled.entry(key) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if !entry.origin.same_storage(bitmap) {
                    entry.image =
                        imageops::resize(bitmap.image(), width, height, FilterType::Nearest);
                    entry.origin = bitmap.clone();
                }
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(ScaledEntry {
                origin: bitmap.clone(),
                image: imageops::resize(bitmap.image(), width, height, FilterType::Nearest),
                last_used: generation,
            }),
        };
        entry.last_used = generation;
        Ok(&entry.image)
    }
}

impl Default for CompositeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use livemix_layout_model::engine::resolve;
    use livemix_layout_model::layout::{RawLayout, RawOverlay, RawPosition, RawRect};
    use livemix_layout_model::source::FrameSource;

    use super::*;
    use crate::sources::{FeedPoll, StillFeed};

    const RED: Color = Color::rgb(255, 0, 0);
    const BLUE: Color = Color::rgb(0, 0, 255);
    const GREEN: Color = Color::rgb(0, 255, 0);

    fn still(registry: &mut SourceRegistry, source: FrameSource, w: u32, h: u32, color: Color) {
        registry.register(source, Box::new(StillFeed::new(Bitmap::solid(w, h, color))));
    }

    fn px(frame: &CompositeFrame, x: u32, y: u32) -> [u8; 4] {
        frame.pixels.get_pixel(x, y).0
    }

    #[test]
    fn draws_background_sources_and_overlays_in_order() {
        let mut target = RenderTarget::new(64, 32, 30).unwrap();
        let mut registry = SourceRegistry::new();
        still(&mut registry, FrameSource::live_track("a"), 8, 8, RED);
        still(&mut registry, FrameSource::live_track("b"), 8, 8, BLUE);
        still(&mut registry, FrameSource::overlay("logo"), 2, 2, GREEN);
        registry.refresh();

        let raw = RawLayout {
            positions: vec![
                RawPosition::new("a", 0.0, 0.0, 32.0, 32.0),
                RawPosition::new("b", 16.0, 0.0, 32.0, 32.0).with_z(1),
            ],
            background: BackgroundRef::Color {
                color: Color::rgb(10, 10, 10),
            },
            overlays: vec![RawOverlay::at(
                "logo",
                RawRect {
                    x: 60.0,
                    y: 28.0,
                    width: 4.0,
                    height: 4.0,
                },
            )],
        };
        let layout = resolve(&raw, 64, 32);

        let mut renderer = CompositeRenderer::new();
        let outcome = renderer
            .draw(&mut target, &layout, &registry, 1, Duration::ZERO)
            .unwrap();
        let frame = &outcome.frame;

        assert_eq!(px(frame, 0, 0), RED.to_array());
        // b (z=1) paints over a where they overlap
        assert_eq!(px(frame, 20, 10), BLUE.to_array());
        assert_eq!(px(frame, 50, 5), [10, 10, 10, 255]);
        assert_eq!(px(frame, 62, 30), GREEN.to_array());
        assert_eq!(outcome.report.drawn, 3);
        assert!(outcome.report.failures.is_empty());
    }

    #[test]
    fn missing_source_draws_placeholder_not_error() {
        let mut target = RenderTarget::new(32, 32, 30).unwrap();
        let registry = SourceRegistry::new();
        let raw = RawLayout {
            positions: vec![RawPosition::new("ghost", 4.0, 4.0, 8.0, 8.0)],
            ..RawLayout::default()
        };
        let layout = resolve(&raw, 32, 32);

        let outcome = CompositeRenderer::new()
            .draw(&mut target, &layout, &registry, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(px(&outcome.frame, 5, 5), Color::PLACEHOLDER.to_array());
        assert_eq!(px(&outcome.frame, 0, 0), Color::BLACK.to_array());
        assert_eq!(outcome.report.placeholders, 1);
        assert!(outcome.report.failures.is_empty());
    }

    #[test]
    fn failed_source_is_isolated() {
        let mut target = RenderTarget::new(32, 16, 30).unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(
            FrameSource::live_track("bad"),
            Box::new(|| FeedPoll::Failed("corrupt frame".to_string())),
        );
        registry.register(
            FrameSource::live_track("empty"),
            Box::new(|| FeedPoll::Ready(Bitmap::from_image(RgbaImage::new(0, 0)))),
        );
        still(&mut registry, FrameSource::live_track("good"), 4, 4, RED);
        registry.refresh();

        let raw = RawLayout {
            positions: vec![
                RawPosition::new("bad", 0.0, 0.0, 8.0, 16.0),
                RawPosition::new("empty", 8.0, 0.0, 8.0, 16.0),
                RawPosition::new("good", 16.0, 0.0, 16.0, 16.0),
            ],
            ..RawLayout::default()
        };
        let layout = resolve(&raw, 32, 16);
        let outcome = CompositeRenderer::new()
            .draw(&mut target, &layout, &registry, 7, Duration::from_millis(10))
            .unwrap();

        assert_eq!(outcome.report.failures.len(), 2);
        assert!(outcome
            .report
            .failures
            .iter()
            .all(|e| matches!(e, LivemixError::SourceDecodeFailure { .. })));
        assert_eq!(outcome.report.placeholders, 2);
        assert_eq!(px(&outcome.frame, 20, 8), RED.to_array());
        assert_eq!(px(&outcome.frame, 2, 2), Color::PLACEHOLDER.to_array());
        assert_eq!(outcome.frame.sequence, 7);
    }

    #[test]
    fn pending_overlay_and_background_are_skipped() {
        let mut target = RenderTarget::new(8, 8, 30).unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(FrameSource::background("bg"), Box::new(|| FeedPoll::Pending));
        registry.register(FrameSource::overlay("frame"), Box::new(|| FeedPoll::Pending));
        registry.refresh();

        let raw = RawLayout {
            background: BackgroundRef::Source {
                source_id: "bg".into(),
            },
            overlays: vec![RawOverlay::fill("frame")],
            ..RawLayout::default()
        };
        let outcome = CompositeRenderer::new()
            .draw(&mut target, &resolve(&raw, 8, 8), &registry, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(outcome.report.skipped, 2);
        assert_eq!(px(&outcome.frame, 4, 4), Color::BLACK.to_array());
    }

    #[test]
    fn background_source_is_scaled_to_fill() {
        let mut target = RenderTarget::new(16, 16, 30).unwrap();
        let mut registry = SourceRegistry::new();
        still(&mut registry, FrameSource::background("beach"), 2, 2, BLUE);
        registry.refresh();
        let raw = RawLayout {
            background: BackgroundRef::Source {
                source_id: "beach".into(),
            },
            ..RawLayout::default()
        };
        let outcome = CompositeRenderer::new()
            .draw(&mut target, &resolve(&raw, 16, 16), &registry, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(px(&outcome.frame, 0, 0), BLUE.to_array());
        assert_eq!(px(&outcome.frame, 15, 15), BLUE.to_array());
    }

    #[test]
    fn circle_shape_leaves_corners_to_background() {
        let mut target = RenderTarget::new(20, 20, 30).unwrap();
        let mut registry = SourceRegistry::new();
        still(&mut registry, FrameSource::live_track("a"), 20, 20, RED);
        registry.refresh();
        let raw = RawLayout {
            positions: vec![
                RawPosition::new("a", 0.0, 0.0, 20.0, 20.0).with_shape(Shape::Circle)
            ],
            ..RawLayout::default()
        };
        let outcome = CompositeRenderer::new()
            .draw(&mut target, &resolve(&raw, 20, 20), &registry, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(px(&outcome.frame, 0, 0), Color::BLACK.to_array());
        assert_eq!(px(&outcome.frame, 10, 10), RED.to_array());
    }

    #[test]
    fn layout_for_another_canvas_is_a_frame_error() {
        let mut target = RenderTarget::new(16, 16, 30).unwrap();
        let layout = resolve(&RawLayout::default(), 32, 32);
        let err = CompositeRenderer::new()
            .draw(&mut target, &layout, &SourceRegistry::new(), 1, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, LivemixError::Render { .. }));
    }

    #[test]
    fn scale_cache_drops_unused_entries() {
        let mut target = RenderTarget::new(16, 16, 30).unwrap();
        let mut registry = SourceRegistry::new();
        still(&mut registry, FrameSource::static_image("img"), 4, 4, RED);
        registry.refresh();
        let mut renderer = CompositeRenderer::new();

        let with_image = RawLayout {
            positions: vec![RawPosition::new("img", 0.0, 0.0, 8.0, 8.0)],
            ..RawLayout::default()
        };
        renderer
            .draw(&mut target, &resolve(&with_image, 16, 16), &registry, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(renderer.scaled.len(), 1);

        renderer
            .draw(
                &mut target,
                &resolve(&RawLayout::default(), 16, 16),
                &registry,
                2,
                Duration::ZERO,
            )
            .unwrap();
        assert!(renderer.scaled.is_empty());
    }
}
