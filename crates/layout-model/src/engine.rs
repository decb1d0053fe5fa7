//! Layout resolution.
//!
//! Turns a [`RawLayout`] into a bounds-safe [`Layout`]. Pure: no I/O, no
//! knowledge of which sources currently exist. A position that names an
//! unknown source is kept so the renderer can draw a placeholder there.

use crate::geometry::Rect;
use crate::layout::{
    Layout, LayoutPosition, OverlayLayer, OverlayPlacement, RawLayout, RawPosition, Shape,
};

/// Resolves raw layouts against a canvas.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutEngine;

impl LayoutEngine {
    /// Resolve `raw` for a canvas of `canvas_width` x `canvas_height`.
    ///
    /// Every rectangle in the result satisfies `x + width <= canvas_width`
    /// and `y + height <= canvas_height`. Positions are ordered by ascending
    /// `z_index`; equal z values keep their request order.
    pub fn resolve(raw: &RawLayout, canvas_width: u32, canvas_height: u32) -> Layout {
        let mut positions: Vec<LayoutPosition> = raw
            .positions
            .iter()
            .map(|p| resolve_position(p, canvas_width, canvas_height))
            .collect();
        // stable: ties keep request order
        positions.sort_by_key(|p| p.z_index);

        let mut overlays: Vec<OverlayLayer> = raw
            .overlays
            .iter()
            .map(|o| OverlayLayer {
                source_id: o.source_id.clone(),
                z_index: o.z_index,
                placement: match o.rect {
                    None => OverlayPlacement::Fill,
                    Some(r) => OverlayPlacement::Rect {
                        rect: Rect::clamp_into(
                            r.x,
                            r.y,
                            r.width,
                            r.height,
                            canvas_width,
                            canvas_height,
                        ),
                    },
                },
            })
            .collect();
        overlays.sort_by_key(|o| o.z_index);

        tracing::trace!(
            positions = positions.len(),
            overlays = overlays.len(),
            canvas_width,
            canvas_height,
            "Layout resolved"
        );

        Layout::from_parts(
            canvas_width,
            canvas_height,
            positions,
            raw.background.clone(),
            overlays,
        )
    }
}

/// Free-function form of [`LayoutEngine::resolve`].
pub fn resolve(raw: &RawLayout, canvas_width: u32, canvas_height: u32) -> Layout {
    LayoutEngine::resolve(raw, canvas_width, canvas_height)
}

fn resolve_position(raw: &RawPosition, canvas_width: u32, canvas_height: u32) -> LayoutPosition {
    let rect = Rect::clamp_into(
        raw.x,
        raw.y,
        raw.width,
        raw.height,
        canvas_width,
        canvas_height,
    );
    LayoutPosition {
        source_id: raw.source_id.clone(),
        rect,
        z_index: raw.z_index,
        shape: clamp_shape(raw.shape, rect),
    }
}

fn clamp_shape(shape: Shape, rect: Rect) -> Shape {
    match shape {
        Shape::Rounded { radius } => {
            let max = rect.width.min(rect.height) as f64 / 2.0;
            let radius = if radius.is_finite() {
                radius.clamp(0.0, max)
            } else {
                0.0
            };
            Shape::Rounded { radius }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::layout::{BackgroundRef, RawOverlay, RawRect};
    use crate::source::SourceId;

    fn layout_of(positions: Vec<RawPosition>) -> RawLayout {
        RawLayout {
            positions,
            ..RawLayout::default()
        }
    }

    #[test]
    fn resolves_half_screen_participant() {
        let raw = layout_of(vec![RawPosition::new("a", 0.0, 0.0, 640.0, 720.0)]);
        let layout = LayoutEngine::resolve(&raw, 1280, 720);
        assert_eq!(layout.positions().len(), 1);
        assert_eq!(layout.positions()[0].rect, Rect::new(0, 0, 640, 720));
        assert_eq!(layout.canvas_width(), 1280);
    }

    #[test]
    fn oversized_request_is_shrunk_not_rejected() {
        let raw = layout_of(vec![RawPosition::new("a", 100.0, 100.0, 4000.0, 3000.0)]);
        let layout = LayoutEngine::resolve(&raw, 1280, 720);
        assert_eq!(layout.positions()[0].rect, Rect::full(1280, 720));
    }

    #[test]
    fn unknown_sources_are_kept() {
        let raw = layout_of(vec![RawPosition::new("nobody", 10.0, 10.0, 50.0, 50.0)]);
        let layout = resolve(&raw, 320, 240);
        assert_eq!(layout.positions()[0].source_id, SourceId::from("nobody"));
    }

    #[test]
    fn z_ties_keep_request_order() {
        let raw = layout_of(vec![
            RawPosition::new("top", 0.0, 0.0, 10.0, 10.0).with_z(5),
            RawPosition::new("first", 0.0, 0.0, 10.0, 10.0).with_z(1),
            RawPosition::new("second", 0.0, 0.0, 10.0, 10.0).with_z(1),
            RawPosition::new("bottom", 0.0, 0.0, 10.0, 10.0).with_z(-2),
        ]);
        let layout = resolve(&raw, 100, 100);
        let order: Vec<&str> = layout
            .positions()
            .iter()
            .map(|p| p.source_id.as_str())
            .collect();
        assert_eq!(order, vec!["bottom", "first", "second", "top"]);
    }

    #[test]
    fn overlays_keep_declared_order_for_equal_z() {
        let raw = RawLayout {
            overlays: vec![
                RawOverlay::fill("frame"),
                RawOverlay::at(
                    "logo",
                    RawRect {
                        x: 1250.0,
                        y: -20.0,
                        width: 64.0,
                        height: 64.0,
                    },
                ),
                RawOverlay::fill("ticker"),
            ],
            ..RawLayout::default()
        };
        let layout = resolve(&raw, 1280, 720);
        let ids: Vec<&str> = layout
            .overlays()
            .iter()
            .map(|o| o.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["frame", "logo", "ticker"]);
        assert_eq!(
            layout.overlays()[1].placement,
            OverlayPlacement::Rect {
                rect: Rect::new(1216, 0, 64, 64)
            }
        );
        assert_eq!(
            layout.overlays()[0].target_rect(1280, 720),
            Rect::full(1280, 720)
        );
    }

    #[test]
    fn rounded_radius_is_clamped_to_half_the_short_side() {
        let raw = layout_of(vec![RawPosition::new("a", 0.0, 0.0, 100.0, 40.0)
            .with_shape(Shape::Rounded { radius: 500.0 })]);
        let layout = resolve(&raw, 200, 200);
        assert_eq!(layout.positions()[0].shape, Shape::Rounded { radius: 20.0 });
    }

    #[test]
    fn referenced_sources_are_deduplicated() {
        let raw = RawLayout {
            positions: vec![
                RawPosition::new("a", 0.0, 0.0, 10.0, 10.0),
                RawPosition::new("a", 10.0, 0.0, 10.0, 10.0),
            ],
            background: BackgroundRef::Source {
                source_id: "bg".into(),
            },
            overlays: vec![RawOverlay::fill("logo")],
        };
        let layout = resolve(&raw, 100, 100);
        let ids: Vec<&str> = layout
            .referenced_sources()
            .into_iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(ids, vec!["bg", "a", "logo"]);
    }

    proptest! {
        #[test]
        fn resolved_positions_stay_inside_canvas(
            x in -5000.0f64..5000.0,
            y in -5000.0f64..5000.0,
            w in -100.0f64..10000.0,
            h in -100.0f64..10000.0,
            cw in 1u32..4096,
            ch in 1u32..4096,
        ) {
            let raw = layout_of(vec![RawPosition::new("p", x, y, w, h)]);
            let layout = resolve(&raw, cw, ch);
            let rect = layout.positions()[0].rect;
            prop_assert!(rect.width >= 1 && rect.height >= 1);
            prop_assert!(rect.x + rect.width <= cw);
            prop_assert!(rect.y + rect.height <= ch);
        }

        #[test]
        fn paint_order_is_sorted_and_stable(zs in proptest::collection::vec(-3i32..3, 0..20)) {
            let raw = layout_of(
                zs.iter()
                    .enumerate()
                    .map(|(i, z)| RawPosition::new(format!("s{i}"), 0.0, 0.0, 1.0, 1.0).with_z(*z))
                    .collect(),
            );
            let layout = resolve(&raw, 10, 10);
            for pair in layout.positions().windows(2) {
                prop_assert!(pair[0].z_index <= pair[1].z_index);
                if pair[0].z_index == pair[1].z_index {
                    let a: usize = pair[0].source_id.as_str()[1..].parse().unwrap();
                    let b: usize = pair[1].source_id.as_str()[1..].parse().unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
