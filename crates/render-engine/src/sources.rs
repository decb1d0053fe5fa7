//! Frame source registry.
//!
//! Tracks the drawable inputs currently available to the compositor. Each
//! entry pairs a [`FrameSource`] descriptor with a [`FrameFeed`], the pull
//! interface to the media layer that decodes frames. Once per tick the
//! registry polls every feed (never blocking) and caches the outcome, so the
//! renderer sees one consistent view of all sources for the whole frame.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tokio::sync::watch;

use livemix_common::error::{LivemixError, LivemixResult};
use livemix_layout_model::geometry::Color;
use livemix_layout_model::source::{FrameSource, Readiness, SourceId};

/// A decoded, ready-to-draw RGBA8 image. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    /// Wrap raw RGBA8 bytes, checking the buffer matches the dimensions.
    pub fn from_rgba(
        source_id: &SourceId,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> LivemixResult<Self> {
        if width == 0 || height == 0 {
            return Err(LivemixError::source_decode(
                source_id.as_str(),
                format!("empty frame {width}x{height}"),
            ));
        }
        let len = data.len();
        let image = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            LivemixError::source_decode(
                source_id.as_str(),
                format!("{len} bytes is too small for a {width}x{height} RGBA frame"),
            )
        })?;
        Ok(Self(Arc::new(image)))
    }

    /// Wrap an already-decoded image.
    pub fn from_image(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// A uniformly colored bitmap.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, Rgba(color.to_array())))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Whether two handles share the same pixel storage.
    pub fn same_storage(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Result of polling a feed for its current frame.
#[derive(Debug, Clone)]
pub enum FeedPoll {
    Ready(Bitmap),
    Pending,
    Failed(String),
}

/// Pull interface to the media layer.
///
/// `poll_frame` is called on the render thread once per tick and must
/// return immediately with whatever is currently decoded.
pub trait FrameFeed: Send {
    fn poll_frame(&mut self) -> FeedPoll;
}

impl<F> FrameFeed for F
where
    F: FnMut() -> FeedPoll + Send,
{
    fn poll_frame(&mut self) -> FeedPoll {
        self()
    }
}

/// A feed that always yields the same image (static images, logos, stills).
#[derive(Debug, Clone)]
pub struct StillFeed {
    bitmap: Bitmap,
}

impl StillFeed {
    pub fn new(bitmap: Bitmap) -> Self {
        Self { bitmap }
    }
}

impl FrameFeed for StillFeed {
    fn poll_frame(&mut self) -> FeedPoll {
        FeedPoll::Ready(self.bitmap.clone())
    }
}

/// A feed backed by a latest-value channel. The media layer publishes each
/// decoded frame with the sender; the renderer only ever sees the newest one.
#[derive(Debug)]
pub struct WatchFeed {
    rx: watch::Receiver<FeedPoll>,
}

impl WatchFeed {
    /// Create a connected sender/feed pair.
    pub fn channel(initial: FeedPoll) -> (watch::Sender<FeedPoll>, WatchFeed) {
        let (tx, rx) = watch::channel(initial);
        (tx, WatchFeed { rx })
    }
}

impl FrameFeed for WatchFeed {
    fn poll_frame(&mut self) -> FeedPoll {
        if self.rx.has_changed().is_err() {
            return FeedPoll::Failed("feed disconnected".to_string());
        }
        self.rx.borrow_and_update().clone()
    }
}

/// What the renderer sees for one source during a frame.
#[derive(Debug, Clone, Copy)]
pub enum SourceState<'a> {
    Ready(&'a Bitmap),
    Pending,
    Failed(&'a str),
    Missing,
}

/// Readiness counts after a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
}

struct SourceEntry {
    source: FrameSource,
    feed: Box<dyn FrameFeed>,
    current: Option<Bitmap>,
    failure: Option<String>,
}

/// All sources currently available to the compositor.
#[derive(Default)]
pub struct SourceRegistry {
    entries: HashMap<SourceId, SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any existing source with the same id.
    /// Returns the descriptor that was replaced.
    pub fn register(
        &mut self,
        source: FrameSource,
        feed: Box<dyn FrameFeed>,
    ) -> Option<FrameSource> {
        tracing::debug!(source = %source.id, kind = ?source.kind, "Registering frame source");
        let id = source.id.clone();
        let mut source = source;
        source.readiness = Readiness::Pending;
        self.entries
            .insert(
                id,
                SourceEntry {
                    source,
                    feed,
                    current: None,
                    failure: None,
                },
            )
            .map(|old| old.source)
    }

    /// Remove a source and release its feed. Returns whether it existed.
    pub fn remove(&mut self, id: &SourceId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            tracing::debug!(source = %id, "Frame source removed");
        }
        removed
    }

    /// Release every source. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor of a registered source.
    pub fn get(&self, id: &SourceId) -> Option<&FrameSource> {
        self.entries.get(id).map(|e| &e.source)
    }

    /// All registered descriptors (unordered).
    pub fn sources(&self) -> impl Iterator<Item = &FrameSource> {
        self.entries.values().map(|e| &e.source)
    }

    /// Poll every feed once and update readiness.
    pub fn refresh(&mut self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for (id, entry) in self.entries.iter_mut() {
            match entry.feed.poll_frame() {
                FeedPoll::Ready(bitmap) => {
                    if entry.failure.take().is_some() {
                        tracing::info!(source = %id, "Frame source recovered");
                    }
                    entry.current = Some(bitmap);
                    entry.source.readiness = Readiness::Ready;
                    summary.ready += 1;
                }
                FeedPoll::Pending => {
                    entry.current = None;
                    entry.failure = None;
                    entry.source.readiness = Readiness::Pending;
                    summary.pending += 1;
                }
                FeedPoll::Failed(reason) => {
                    if entry.failure.as_deref() != Some(reason.as_str()) {
                        tracing::warn!(source = %id, %reason, "Frame source failed to decode");
                    }
                    entry.current = None;
                    entry.failure = Some(reason);
                    entry.source.readiness = Readiness::Failed;
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// The state of a source as of the last refresh.
    pub fn lookup(&self, id: &SourceId) -> SourceState<'_> {
        match self.entries.get(id) {
            None => SourceState::Missing,
            Some(entry) => match (&entry.current, &entry.failure) {
                (Some(bitmap), _) => SourceState::Ready(bitmap),
                (None, Some(reason)) => SourceState::Failed(reason),
                (None, None) => SourceState::Pending,
            },
        }
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.entries.len())
            .finish()
    }
}
