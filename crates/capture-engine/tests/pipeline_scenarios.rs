use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use livemix_capture_engine::control::ControlEvent;
use livemix_capture_engine::pipeline::{PipelineConfig, PipelineHandle};
use livemix_capture_engine::recorder::FrameEncoder;
use livemix_common::config::BufferConfig;
use livemix_common::error::{LivemixError, LivemixResult};
use livemix_layout_model::geometry::Color;
use livemix_layout_model::layout::{RawLayout, RawPosition};
use livemix_layout_model::source::FrameSource;
use livemix_render_engine::sources::{Bitmap, FeedPoll, FrameFeed, StillFeed};
use livemix_render_engine::target::CompositeFrame;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps only a few bytes per frame so full-HD runs stay small.
struct TinyEncoder;

impl FrameEncoder for TinyEncoder {
    fn format(&self) -> &str {
        "test"
    }

    fn encode(&mut self, frame: &CompositeFrame) -> LivemixResult<Arc<[u8]>> {
        Ok(Arc::from(frame.sequence.to_le_bytes().as_slice()))
    }
}

struct CountingFeed(Arc<AtomicUsize>);

impl FrameFeed for CountingFeed {
    fn poll_frame(&mut self) -> FeedPoll {
        FeedPoll::Ready(Bitmap::solid(4, 4, Color::rgb(200, 10, 10)))
    }
}

impl Drop for CountingFeed {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

async fn next_event(events: &mut UnboundedReceiver<ControlEvent>) -> ControlEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a control event")
        .expect("event channel closed")
}

async fn wait_for(
    events: &mut UnboundedReceiver<ControlEvent>,
    mut pred: impl FnMut(&ControlEvent) -> bool,
) -> ControlEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Drain events for `window`, returning everything seen.
async fn collect_for(
    events: &mut UnboundedReceiver<ControlEvent>,
    window: Duration,
) -> Vec<ControlEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}

fn spawn(config: PipelineConfig) -> (PipelineHandle, UnboundedReceiver<ControlEvent>) {
    PipelineHandle::spawn_with_encoder(config, Box::new(TinyEncoder)).unwrap()
}

fn is_error(event: &ControlEvent) -> bool {
    matches!(event, ControlEvent::Error { .. })
}

fn frame_rendered(event: &ControlEvent) -> Option<(u64, f64)> {
    match event {
        ControlEvent::FrameRendered {
            sequence,
            timestamp,
            ..
        } => Some((*sequence, *timestamp)),
        _ => None,
    }
}

#[tokio::test]
async fn messages_before_init_are_rejected() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());

    pipeline.render(None, None, None).await.unwrap();
    match next_event(&mut events).await {
        ControlEvent::Error { message } => assert!(message.contains("before init"), "{message}"),
        other => panic!("expected error, got {other:?}"),
    }
    pipeline.update_layout(RawLayout::default()).await.unwrap();
    assert!(is_error(&next_event(&mut events).await));
    pipeline.stop().await.unwrap();
    assert!(is_error(&next_event(&mut events).await));

    pipeline.init(64, 36, 30).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ControlEvent::Initialized {
            width: 64,
            height: 36,
            fps: 30
        }
    );
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_init_can_be_retried() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());

    pipeline.init(0, 720, 30).await.unwrap();
    match next_event(&mut events).await {
        ControlEvent::Error { message } => {
            assert!(message.contains("Render target unavailable"), "{message}")
        }
        other => panic!("expected error, got {other:?}"),
    }
    pipeline.init(1280, 720, 0).await.unwrap();
    assert!(is_error(&next_event(&mut events).await));

    pipeline.init(64, 36, 30).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ControlEvent::Initialized { .. }
    ));

    // A second init on a live session is refused.
    pipeline.init(64, 36, 30).await.unwrap();
    assert!(is_error(&next_event(&mut events).await));
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn frame_pacing_stays_near_target_rate() {
    let fps = 30;
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    pipeline.init(64, 36, fps).await.unwrap();
    pipeline.render(None, None, None).await.unwrap();

    let mut stamps = Vec::new();
    while stamps.len() < 30 {
        if let Some((_, ts)) = frame_rendered(&next_event(&mut events).await) {
            stamps.push(ts);
        }
    }
    let mean = (stamps[stamps.len() - 1] - stamps[0]) / (stamps.len() - 1) as f64;
    let target = 1000.0 / fps as f64;
    assert!(
        (mean - target).abs() <= target * 0.15,
        "mean interval {mean:.2}ms vs target {target:.2}ms"
    );
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn ninety_ticks_buffer_about_three_seconds() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    let card = Bitmap::solid(64, 72, Color::rgb(0, 128, 255));
    pipeline
        .add_source(FrameSource::live_track("a"), Box::new(StillFeed::new(card)))
        .await
        .unwrap();
    pipeline.init(1280, 720, 30).await.unwrap();
    pipeline
        .render(
            Some(vec![RawPosition::new("a", 0.0, 0.0, 640.0, 720.0)]),
            None,
            None,
        )
        .await
        .unwrap();

    let last = wait_for(&mut events, |e| {
        frame_rendered(e).is_some_and(|(seq, _)| seq == 90)
    })
    .await;
    let (_, last_ts_ms) = frame_rendered(&last).unwrap();
    let buffered = pipeline.buffered_duration().as_secs_f64();
    let frame = 1.0 / 30.0;

    // At least the 90 frames seen so far; more may land while the test reads.
    assert!(buffered + 1e-6 >= last_ts_ms / 1000.0 + frame, "buffered {buffered}");
    assert!((buffered - 3.0).abs() < 0.25, "buffered {buffered}");
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_sources_once() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    for id in ["a", "b", "c"] {
        pipeline
            .add_source(
                FrameSource::live_track(id),
                Box::new(CountingFeed(dropped.clone())),
            )
            .await
            .unwrap();
    }
    pipeline.init(64, 36, 60).await.unwrap();
    pipeline
        .render(
            Some(vec![
                RawPosition::new("a", 0.0, 0.0, 20.0, 36.0),
                RawPosition::new("b", 20.0, 0.0, 20.0, 36.0),
                RawPosition::new("c", 40.0, 0.0, 24.0, 36.0),
            ]),
            None,
            None,
        )
        .await
        .unwrap();
    wait_for(&mut events, |e| frame_rendered(e).is_some()).await;

    pipeline.stop().await.unwrap();
    pipeline.stop().await.unwrap();
    wait_for(&mut events, |e| *e == ControlEvent::Stopped).await;

    let after = collect_for(&mut events, Duration::from_millis(200)).await;
    assert!(
        after.iter().all(|e| frame_rendered(e).is_none()),
        "frames after stop: {after:?}"
    );
    assert!(!after.iter().any(|e| *e == ControlEvent::Stopped));
    assert!(!after.iter().any(is_error));
    assert_eq!(dropped.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.buffered_duration(), Duration::ZERO);
    assert!(pipeline.preview().borrow().is_none());

    // A fresh session can start after stop.
    pipeline.init(32, 32, 30).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ControlEvent::Initialized { .. }
    ));
    pipeline.shutdown().await.unwrap();
    assert_eq!(dropped.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_source_renders_placeholder() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    pipeline.init(32, 32, 30).await.unwrap();
    pipeline
        .render(
            Some(vec![RawPosition::new("ghost", 0.0, 0.0, 16.0, 16.0)]),
            None,
            None,
        )
        .await
        .unwrap();
    wait_for(&mut events, |e| frame_rendered(e).is_some()).await;

    let preview = pipeline.preview();
    let frame = preview.borrow().clone().expect("a frame was rendered");
    assert_eq!((frame.width, frame.height), (32, 32));
    assert_eq!(frame.pixels.get_pixel(4, 4).0, Color::PLACEHOLDER.to_array());
    assert_eq!(frame.pixels.get_pixel(20, 20).0, Color::BLACK.to_array());
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn layout_updates_and_source_removal_take_effect() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    pipeline
        .add_source(
            FrameSource::live_track("cam"),
            Box::new(StillFeed::new(Bitmap::solid(8, 8, Color::rgb(0, 255, 0)))),
        )
        .await
        .unwrap();
    pipeline.init(32, 32, 60).await.unwrap();
    pipeline.render(None, None, None).await.unwrap();
    wait_for(&mut events, |e| frame_rendered(e).is_some()).await;

    pipeline
        .update_layout(RawLayout {
            positions: vec![RawPosition::new("cam", 0.0, 0.0, 32.0, 32.0)],
            ..RawLayout::default()
        })
        .await
        .unwrap();
    assert!(center_becomes(&pipeline, &mut events, [0, 255, 0, 255]).await);

    pipeline.remove_source("cam").await.unwrap();
    assert!(center_becomes(&pipeline, &mut events, Color::PLACEHOLDER.to_array()).await);
    pipeline.shutdown().await.unwrap();
}

/// Whether the preview's center pixel reaches `expected` within a few frames.
/// Frames already in flight when a command is sent may still show the old state.
async fn center_becomes(
    pipeline: &PipelineHandle,
    events: &mut UnboundedReceiver<ControlEvent>,
    expected: [u8; 4],
) -> bool {
    for _ in 0..30 {
        wait_for(events, |e| frame_rendered(e).is_some()).await;
        let frame = pipeline.preview().borrow().clone();
        if frame.is_some_and(|f| f.pixels.get_pixel(16, 16).0 == expected) {
            return true;
        }
    }
    false
}

#[tokio::test]
async fn clips_come_from_the_live_buffer() {
    let config = PipelineConfig {
        buffer: BufferConfig {
            retention_secs: 1.0,
            segment_secs: 0.25,
        },
        ..PipelineConfig::default()
    };
    let (pipeline, mut events) = spawn(config);
    pipeline.init(32, 18, 30).await.unwrap();
    pipeline.render(None, None, None).await.unwrap();
    // 1.5s of output against a 1s window
    wait_for(&mut events, |e| {
        frame_rendered(e).is_some_and(|(seq, _)| seq >= 45)
    })
    .await;

    let buffered = pipeline.buffered_duration().as_secs_f64();
    assert!(buffered <= 1.0 && buffered > 0.7, "buffered {buffered}");

    let clip = pipeline.extract_clip(0.5).unwrap();
    assert!(clip.duration() >= Duration::from_millis(500));
    assert!(clip.duration() < Duration::from_millis(500) + Duration::from_millis(34));
    assert_eq!(clip.format, "test");
    assert_eq!((clip.width, clip.height, clip.fps), (32, 18, 30));

    match pipeline.extract_clip(5.0) {
        Err(LivemixError::InsufficientBuffer {
            requested_secs,
            available_secs,
        }) => {
            assert_eq!(requested_secs, 5.0);
            assert!(available_secs <= 1.0 && available_secs > 0.7);
        }
        other => panic!("expected InsufficientBuffer, got {other:?}"),
    }
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_a_running_session() {
    let (pipeline, mut events) = spawn(PipelineConfig::default());
    pipeline.init(16, 16, 30).await.unwrap();
    pipeline.render(None, None, None).await.unwrap();
    wait_for(&mut events, |e| frame_rendered(e).is_some()).await;

    pipeline.shutdown().await.unwrap();
    let rest = collect_for(&mut events, Duration::from_millis(100)).await;
    assert!(rest.contains(&ControlEvent::Stopped));
    // worker is gone, so the channel is closed
    assert!(events.recv().await.is_none());
}
