//! Run the compositor on synthetic sources and save the tail of the buffer.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use livemix_capture_engine::{ControlEvent, PipelineConfig, PipelineHandle};
use livemix_common::config::{validate_canvas, AppConfig};
use livemix_common::error::LivemixError;
use livemix_layout_model::{
    BackgroundRef, Color, FrameSource, RawLayout, RawOverlay, RawPosition, RawRect, Shape,
    SourceId,
};
use livemix_render_engine::{Bitmap, FeedPoll, StillFeed, WatchFeed};

const CARD_WIDTH: u32 = 96;
const CARD_HEIGHT: u32 = 54;

pub struct DemoOptions {
    pub secs: f64,
    pub clip_secs: f64,
    pub output: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Default)]
struct EventTally {
    frames: u64,
    errors: u64,
    worst_gap_ms: f64,
}

pub async fn run(config: &AppConfig, options: DemoOptions) -> anyhow::Result<()> {
    validate_canvas(options.width, options.height, options.fps)?;
    if !options.secs.is_finite() || options.secs <= 0.0 {
        anyhow::bail!("--secs must be positive");
    }

    let output = options.output.clone().unwrap_or_else(|| {
        config
            .clips_dir
            .join(chrono::Local::now().format("demo-%Y%m%d-%H%M%S").to_string())
    });

    let (pipeline, mut events) = PipelineHandle::spawn(PipelineConfig::from(config))?;

    let tally = tokio::spawn(async move {
        let mut tally = EventTally::default();
        while let Some(event) = events.recv().await {
            match event {
                ControlEvent::Initialized { width, height, fps } => {
                    tracing::info!(width, height, fps, "Render target ready");
                }
                ControlEvent::FrameRendered {
                    since_last_frame, ..
                } => {
                    tally.frames += 1;
                    if let Some(gap) = since_last_frame {
                        tally.worst_gap_ms = tally.worst_gap_ms.max(gap);
                    }
                }
                ControlEvent::Error { message } => {
                    tally.errors += 1;
                    tracing::warn!(%message, "Pipeline reported an error");
                }
                ControlEvent::Stopped => tracing::info!("Pipeline stopped"),
            }
        }
        tally
    });

    register_sources(&pipeline).await?;

    pipeline
        .init(options.width, options.height, options.fps)
        .await?;
    let initial = grid_layout(options.width, options.height, false);
    pipeline
        .render(
            Some(initial.positions),
            Some(initial.background),
            Some(initial.overlays),
        )
        .await?;

    println!(
        "Rendering {}x{} @ {}fps for {:.1}s...",
        options.width, options.height, options.fps, options.secs
    );

    // Swap the two live cards halfway through.
    let half = Duration::from_secs_f64(options.secs / 2.0);
    tokio::time::sleep(half).await;
    pipeline
        .update_layout(grid_layout(options.width, options.height, true))
        .await?;
    tokio::time::sleep(Duration::from_secs_f64(options.secs).saturating_sub(half)).await;

    let buffered = pipeline.buffered_duration().as_secs_f64();
    let clip = match pipeline.extract_clip(options.clip_secs) {
        Ok(clip) => clip,
        Err(LivemixError::InsufficientBuffer { available_secs, .. }) if available_secs > 0.0 => {
            println!(
                "Only {available_secs:.2}s buffered; saving that instead of {:.2}s",
                options.clip_secs
            );
            pipeline.extract_clip(available_secs)?
        }
        Err(e) => return Err(e.into()),
    };

    pipeline.stop().await?;
    pipeline.shutdown().await?;
    let tally = tally.await?;

    std::fs::create_dir_all(&output)?;
    let manifest_path = output.join("clip.json");
    let payload_path = output.join("clip.rgba");
    std::fs::write(
        &manifest_path,
        serde_json::to_string_pretty(&clip.manifest())?,
    )?;
    clip.write_payload(BufWriter::new(File::create(&payload_path)?))?;

    println!();
    println!("Frames rendered: {}", tally.frames);
    println!("Worst frame gap: {:.1}ms", tally.worst_gap_ms);
    println!("Errors reported: {}", tally.errors);
    println!("Buffered at cut: {buffered:.2}s");
    println!();
    println!("Clip:");
    println!(
        "  {} frames, {:.3}s ({:.3}s..{:.3}s)",
        clip.frame_count(),
        clip.duration().as_secs_f64(),
        clip.start.as_secs_f64(),
        clip.end.as_secs_f64()
    );
    println!("  {}x{} {} ({} bytes)", clip.width, clip.height, clip.format, clip.byte_len());
    println!("  Manifest: {}", manifest_path.display());
    println!("  Payload:  {}", payload_path.display());
    Ok(())
}

/// Register the demo's inputs: two animated cards, a logo still, and a camera
/// that never produces a frame.
async fn register_sources(pipeline: &PipelineHandle) -> anyhow::Result<()> {
    let started = Instant::now();
    let sweep_id = SourceId::new("sweep");
    let sweep_source = sweep_id.clone();
    pipeline
        .add_source(
            FrameSource::live_track(sweep_id),
            Box::new(move || {
                let phase = started.elapsed().as_secs_f64();
                match sweep_card(&sweep_source, phase) {
                    Ok(bitmap) => FeedPoll::Ready(bitmap),
                    Err(e) => FeedPoll::Failed(e.to_string()),
                }
            }),
        )
        .await?;

    // A producer task publishing at its own pace, like a decoder would.
    let (publisher, feed) = WatchFeed::channel(FeedPoll::Pending);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        let mut step: u32 = 0;
        loop {
            ticker.tick().await;
            let bitmap = Bitmap::solid(CARD_WIDTH, CARD_HEIGHT, palette(step));
            if publisher.send(FeedPoll::Ready(bitmap)).is_err() {
                break;
            }
            step = step.wrapping_add(1);
        }
    });
    pipeline
        .add_source(FrameSource::live_track("pulse"), Box::new(feed))
        .await?;

    pipeline
        .add_source(
            FrameSource::overlay("logo"),
            Box::new(StillFeed::new(Bitmap::solid(
                24,
                24,
                Color::rgba(0xf5, 0xf5, 0xf5, 180),
            ))),
        )
        .await?;

    pipeline
        .add_source(FrameSource::live_track("offline"), Box::new(|| FeedPoll::Pending))
        .await?;
    Ok(())
}

fn grid_layout(width: u32, height: u32, swapped: bool) -> RawLayout {
    let w = f64::from(width);
    let h = f64::from(height);
    let cell_w = w / 3.0;
    let cell_h = h / 2.0;
    let (left, middle) = if swapped {
        ("pulse", "sweep")
    } else {
        ("sweep", "pulse")
    };

    RawLayout {
        positions: vec![
            RawPosition::new(left, 0.0, cell_h / 2.0, cell_w, cell_h),
            RawPosition::new(middle, cell_w, cell_h / 2.0, cell_w, cell_h)
                .with_shape(Shape::Circle),
            RawPosition::new("offline", 2.0 * cell_w, cell_h / 2.0, cell_w, cell_h)
                .with_shape(Shape::Rounded { radius: 12.0 }),
        ],
        background: BackgroundRef::Color {
            color: Color::rgb(0x10, 0x18, 0x20),
        },
        overlays: vec![RawOverlay::at(
            "logo",
            RawRect {
                x: w - 32.0,
                y: 8.0,
                width: 24.0,
                height: 24.0,
            },
        )],
    }
}

/// A dark card with a bright bar that crosses it once per second.
fn sweep_card(id: &SourceId, phase: f64) -> livemix_common::error::LivemixResult<Bitmap> {
    let bar_x = ((phase.fract() * f64::from(CARD_WIDTH)) as u32).min(CARD_WIDTH - 1);
    let mut data = Vec::with_capacity((CARD_WIDTH * CARD_HEIGHT * 4) as usize);
    for _ in 0..CARD_HEIGHT {
        for x in 0..CARD_WIDTH {
            let lit = x.abs_diff(bar_x) < 4;
            data.extend_from_slice(if lit {
                &[0xff, 0xc8, 0x3c, 0xff]
            } else {
                &[0x28, 0x3c, 0x5a, 0xff]
            });
        }
    }
    Bitmap::from_rgba(id, CARD_WIDTH, CARD_HEIGHT, data)
}

fn palette(step: u32) -> Color {
    const COLORS: [Color; 4] = [
        Color::rgb(0xe6, 0x39, 0x46),
        Color::rgb(0x2a, 0x9d, 0x8f),
        Color::rgb(0xe9, 0xc4, 0x6a),
        Color::rgb(0x45, 0x7b, 0x9d),
    ];
    COLORS[(step / 5) as usize % COLORS.len()]
}
