//! Canvas-space geometry and colors.
//!
//! All coordinates are integer pixels with `(0, 0)` at the top-left of the
//! output canvas.

use serde::{Deserialize, Serialize};

/// Smallest width/height a resolved rectangle may have.
pub const MIN_RECT_SIZE: u32 = 1;

/// An axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole canvas.
    pub const fn full(canvas_width: u32, canvas_height: u32) -> Self {
        Self::new(0, 0, canvas_width, canvas_height)
    }

    /// Clamp a requested rectangle (arbitrary, possibly negative or
    /// oversized values) so it fits entirely inside the canvas.
    ///
    /// Oversized requests are shrunk to the canvas, never rejected.
    /// Non-finite components are treated as zero.
    pub fn clamp_into(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Self {
        let (x, width) = clamp_axis(x, width, canvas_width);
        let (y, height) = clamp_axis(y, height, canvas_height);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the rectangle lies entirely inside a canvas.
    pub fn fits_within(&self, canvas_width: u32, canvas_height: u32) -> bool {
        self.right() <= canvas_width && self.bottom() <= canvas_height
    }

    /// Check if a pixel is inside this rectangle.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

fn clamp_axis(origin: f64, extent: f64, canvas: u32) -> (u32, u32) {
    let canvas = canvas.max(MIN_RECT_SIZE) as f64;
    let extent = finite_or_zero(extent)
        .round()
        .clamp(MIN_RECT_SIZE as f64, canvas);
    let origin = finite_or_zero(origin).round().clamp(0.0, canvas - extent);
    (origin as u32, extent as u32)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// An RGBA color with straight (non-premultiplied) alpha.
///
/// Serialized as a `#rrggbb` or `#rrggbbaa` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Fill used where a source cannot be drawn.
    pub const PLACEHOLDER: Color = Color::rgb(0x2b, 0x2d, 0x31);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse `#rrggbb` / `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color '{value}'"))
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}
