//! Layout types.
//!
//! A [`RawLayout`] is what the control context sends: loosely-typed,
//! possibly out-of-bounds placements. A [`Layout`] is the validated,
//! bounds-safe version the renderer draws against. The only way to build a
//! `Layout` is [`crate::engine::LayoutEngine::resolve`].

use serde::{Deserialize, Serialize};

use livemix_common::error::{LivemixError, LivemixResult};

use crate::geometry::{Color, Rect};
use crate::source::SourceId;

/// Mask applied to a positioned source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Rectangle,
    /// Rectangle with rounded corners (radius in pixels).
    Rounded { radius: f64 },
    /// Ellipse inscribed in the rectangle.
    Circle,
}

/// What to paint behind all positioned sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundRef {
    Color { color: Color },
    Source {
        #[serde(rename = "sourceId")]
        source_id: SourceId,
    },
}

impl Default for BackgroundRef {
    fn default() -> Self {
        BackgroundRef::Color {
            color: Color::BLACK,
        }
    }
}

/// A requested rectangle, in canvas pixels, not yet clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A requested placement for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub source_id: SourceId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub shape: Shape,
}

impl RawPosition {
    pub fn new(source_id: impl Into<SourceId>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            source_id: source_id.into(),
            x,
            y,
            width,
            height,
            z_index: 0,
            shape: Shape::Rectangle,
        }
    }

    pub fn with_z(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }
}

/// A requested overlay. Without a `rect` the overlay is scaled to fill the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOverlay {
    pub source_id: SourceId,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub rect: Option<RawRect>,
}

impl RawOverlay {
    pub fn fill(source_id: impl Into<SourceId>) -> Self {
        Self {
            source_id: source_id.into(),
            z_index: 0,
            rect: None,
        }
    }

    pub fn at(source_id: impl Into<SourceId>, rect: RawRect) -> Self {
        Self {
            source_id: source_id.into(),
            z_index: 0,
            rect: Some(rect),
        }
    }
}

/// An unvalidated layout as sent by the control context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawLayout {
    #[serde(default)]
    pub positions: Vec<RawPosition>,
    #[serde(default)]
    pub background: BackgroundRef,
    #[serde(default)]
    pub overlays: Vec<RawOverlay>,
}

impl RawLayout {
    /// Parse a layout from JSON.
    pub fn from_json(json: &str) -> LivemixResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LivemixError::layout(format!("Invalid layout JSON: {e}")))
    }

    /// Merge a partial update: fields that are `None` keep their current value.
    pub fn merge(
        &mut self,
        positions: Option<Vec<RawPosition>>,
        background: Option<BackgroundRef>,
        overlays: Option<Vec<RawOverlay>>,
    ) {
        if let Some(positions) = positions {
            self.positions = positions;
        }
        if let Some(background) = background {
            self.background = background;
        }
        if let Some(overlays) = overlays {
            self.overlays = overlays;
        }
    }
}

/// A resolved, bounds-safe placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPosition {
    pub source_id: SourceId,
    pub rect: Rect,
    pub z_index: i32,
    pub shape: Shape,
}

/// Where a resolved overlay is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayPlacement {
    Fill,
    Rect { rect: Rect },
}

/// A resolved overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLayer {
    pub source_id: SourceId,
    pub z_index: i32,
    pub placement: OverlayPlacement,
}

impl OverlayLayer {
    /// Target rectangle on a canvas of the given size.
    pub fn target_rect(&self, canvas_width: u32, canvas_height: u32) -> Rect {
        match self.placement {
            OverlayPlacement::Fill => Rect::full(canvas_width, canvas_height),
            OverlayPlacement::Rect { rect } => rect,
        }
    }
}

/// A validated layout snapshot. Positions and overlays are stored in paint order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    canvas_width: u32,
    canvas_height: u32,
    positions: Vec<LayoutPosition>,
    background: BackgroundRef,
    overlays: Vec<OverlayLayer>,
}

impl Layout {
    pub(crate) fn from_parts(
        canvas_width: u32,
        canvas_height: u32,
        positions: Vec<LayoutPosition>,
        background: BackgroundRef,
        overlays: Vec<OverlayLayer>,
    ) -> Self {
        Self {
            canvas_width,
            canvas_height,
            positions,
            background,
            overlays,
        }
    }

    /// A layout that paints only a black background.
    pub fn empty(canvas_width: u32, canvas_height: u32) -> Self {
        Self::from_parts(
            canvas_width,
            canvas_height,
            Vec::new(),
            BackgroundRef::default(),
            Vec::new(),
        )
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    /// Positions in paint order (ascending z, ties in request order).
    pub fn positions(&self) -> &[LayoutPosition] {
        &self.positions
    }

    pub fn background(&self) -> &BackgroundRef {
        &self.background
    }

    /// Overlays in paint order.
    pub fn overlays(&self) -> &[OverlayLayer] {
        &self.overlays
    }

    /// Every source id the layout references, in paint order, deduplicated.
    pub fn referenced_sources(&self) -> Vec<&SourceId> {
        let mut ids: Vec<&SourceId> = Vec::new();
        let bg = match &self.background {
            BackgroundRef::Source { source_id } => Some(source_id),
            BackgroundRef::Color { .. } => None,
        };
        for id in bg
            .into_iter()
            .chain(self.positions.iter().map(|p| &p.source_id))
            .chain(self.overlays.iter().map(|o| &o.source_id))
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
