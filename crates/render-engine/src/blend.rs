//! CPU pixel operations on RGBA8 canvases.
//!
//! Colors are straight alpha. Shapes are hard-edged masks sampled at pixel
//! centers.

use image::{Pixel, Rgba, RgbaImage};

use livemix_layout_model::geometry::{Color, Rect};
use livemix_layout_model::layout::Shape;

/// Fill the whole canvas with a color (no blending).
pub fn fill(canvas: &mut RgbaImage, color: Color) {
    let row = solid_row(color, canvas.width());
    if row.is_empty() {
        return;
    }
    for dst in canvas.chunks_exact_mut(row.len()) {
        dst.copy_from_slice(&row);
    }
}

fn solid_row(color: Color, width: u32) -> Vec<u8> {
    color
        .to_array()
        .into_iter()
        .cycle()
        .take(width as usize * 4)
        .collect()
}

/// Byte range of `width` pixels starting at `(x, y)`.
fn row_span(canvas_width: u32, x: u32, y: u32, width: u32) -> std::ops::Range<usize> {
    let start = (y as usize * canvas_width as usize + x as usize) * 4;
    start..start + width as usize * 4
}

/// Whether the local pixel `(lx, ly)` of a `width` x `height` rectangle lies
/// inside `shape`.
pub fn shape_covers(shape: Shape, width: u32, height: u32, lx: u32, ly: u32) -> bool {
    let cx = lx as f64 + 0.5;
    let cy = ly as f64 + 0.5;
    let w = width as f64;
    let h = height as f64;
    match shape {
        Shape::Rectangle => true,
        Shape::Circle => {
            let rx = w / 2.0;
            let ry = h / 2.0;
            let dx = (cx - rx) / rx;
            let dy = (cy - ry) / ry;
            dx * dx + dy * dy <= 1.0
        }
        Shape::Rounded { radius } => {
            if radius <= 0.0 {
                return true;
            }
            // Distance from the nearest corner circle's center, when the
            // pixel is inside a corner square.
            let corner_x = if cx < radius {
                Some(radius)
            } else if cx > w - radius {
                Some(w - radius)
            } else {
                None
            };
            let corner_y = if cy < radius {
                Some(radius)
            } else if cy > h - radius {
                Some(h - radius)
            } else {
                None
            };
            match (corner_x, corner_y) {
                (Some(ox), Some(oy)) => {
                    let dx = cx - ox;
                    let dy = cy - oy;
                    dx * dx + dy * dy <= radius * radius
                }
                _ => true,
            }
        }
    }
}

/// Fill `rect` (masked by `shape`) with a solid color, blending if translucent.
pub fn fill_shape(canvas: &mut RgbaImage, rect: Rect, shape: Shape, color: Color) {
    let px = Rgba(color.to_array());
    let Some(rect) = clip_to_canvas(canvas, rect) else {
        return;
    };
    if matches!(shape, Shape::Rectangle) && color.a == 255 {
        let row = solid_row(color, rect.width);
        let canvas_width = canvas.width();
        for ly in 0..rect.height {
            let span = row_span(canvas_width, rect.x, rect.y + ly, rect.width);
            (**canvas)[span].copy_from_slice(&row);
        }
        return;
    }
    for ly in 0..rect.height {
        for lx in 0..rect.width {
            if !shape_covers(shape, rect.width, rect.height, lx, ly) {
                continue;
            }
            put_blended(canvas, rect.x + lx, rect.y + ly, px);
        }
    }
}

/// Draw `src` into `rect`, masked by `shape`. `src` must already be scaled
/// to the rectangle's size; extra source pixels are ignored.
pub fn blit_shape(canvas: &mut RgbaImage, src: &RgbaImage, rect: Rect, shape: Shape) {
    let Some(clipped) = clip_to_canvas(canvas, rect) else {
        return;
    };
    let width = clipped.width.min(src.width());
    let height = clipped.height.min(src.height());
    let canvas_width = canvas.width();
    for ly in 0..height {
        if matches!(shape, Shape::Rectangle) {
            // Opaque rows are a straight copy.
            let src_row = &(**src)[row_span(src.width(), 0, ly, width)];
            if src_row.chunks_exact(4).all(|p| p[3] == 255) {
                let span = row_span(canvas_width, rect.x, rect.y + ly, width);
                (**canvas)[span].copy_from_slice(src_row);
                continue;
            }
        }
        for lx in 0..width {
            if !shape_covers(shape, rect.width, rect.height, lx, ly) {
                continue;
            }
            put_blended(canvas, rect.x + lx, rect.y + ly, *src.get_pixel(lx, ly));
        }
    }
}

fn put_blended(canvas: &mut RgbaImage, x: u32, y: u32, src: Rgba<u8>) {
    match src[3] {
        0 => {}
        255 => canvas.put_pixel(x, y, src),
        _ => canvas.get_pixel_mut(x, y).blend(&src),
    }
}

/// Intersect `rect` with the canvas. Resolved layouts are always inside the
/// canvas; this keeps the pixel loops panic-free regardless.
fn clip_to_canvas(canvas: &RgbaImage, rect: Rect) -> Option<Rect> {
    if rect.x >= canvas.width() || rect.y >= canvas.height() {
        return None;
    }
    let width = rect.width.min(canvas.width() - rect.x);
    let height = rect.height.min(canvas.height() - rect.y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect::new(rect.x, rect.y, width, height))
}
