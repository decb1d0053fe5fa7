//! Resolve a layout file against a canvas and print what would be drawn.

use std::path::PathBuf;

use livemix_common::config::validate_canvas;
use livemix_layout_model::{BackgroundRef, LayoutEngine, OverlayPlacement, RawLayout, Shape};

pub fn run(file: PathBuf, width: u32, height: u32) -> anyhow::Result<()> {
    // Resolution does not depend on the frame rate; any valid one will do.
    validate_canvas(width, height, 1)?;

    let json = std::fs::read_to_string(&file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", file.display()))?;
    let raw = RawLayout::from_json(&json)?;
    let layout = LayoutEngine::resolve(&raw, width, height);

    println!("Canvas: {width}x{height}");
    match layout.background() {
        BackgroundRef::Color { color } => println!("Background: {}", color.to_hex()),
        BackgroundRef::Source { source_id } => println!("Background: source '{source_id}'"),
    }
    println!();

    println!("Positions (paint order):");
    if layout.positions().is_empty() {
        println!("  (none)");
    }
    for position in layout.positions() {
        let r = position.rect;
        let shape = match position.shape {
            Shape::Rectangle => "rectangle".to_string(),
            Shape::Rounded { radius } => format!("rounded r={radius}"),
            Shape::Circle => "circle".to_string(),
        };
        println!(
            "  {:<16} {:>5},{:<5} {:>5}x{:<5} z={:<3} {}",
            position.source_id.as_str(),
            r.x,
            r.y,
            r.width,
            r.height,
            position.z_index,
            shape
        );
    }
    println!();

    println!("Overlays (paint order):");
    if layout.overlays().is_empty() {
        println!("  (none)");
    }
    for overlay in layout.overlays() {
        match overlay.placement {
            OverlayPlacement::Fill => println!(
                "  {:<16} fill z={}",
                overlay.source_id.as_str(),
                overlay.z_index
            ),
            OverlayPlacement::Rect { rect } => println!(
                "  {:<16} {:>5},{:<5} {:>5}x{:<5} z={}",
                overlay.source_id.as_str(),
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                overlay.z_index
            ),
        }
    }

    Ok(())
}
