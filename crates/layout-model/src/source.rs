//! Frame source descriptors.
//!
//! A frame source is anything the compositor can draw: a participant's live
//! track, a static image, a background asset, or an overlay. Each one has an
//! independent readiness state; the renderer draws a placeholder for anything
//! that is not `Ready`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a drawable input (participant track id, asset handle, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Decode/readiness state of a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    #[default]
    Pending,
    Failed,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }
}

/// What kind of input a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A participant's decoded camera/screen track.
    LiveTrack,
    /// A still image placed in the layout.
    StaticImage,
    /// An image or video used to fill the canvas behind everything.
    Background,
    /// An image or video drawn above all positioned sources.
    Overlay,
}

/// A registered drawable input and its current readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSource {
    pub id: SourceId,
    pub kind: SourceKind,
    pub readiness: Readiness,
}

impl FrameSource {
    pub fn new(id: impl Into<SourceId>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            readiness: Readiness::Pending,
        }
    }

    pub fn live_track(id: impl Into<SourceId>) -> Self {
        Self::new(id, SourceKind::LiveTrack)
    }

    pub fn static_image(id: impl Into<SourceId>) -> Self {
        Self::new(id, SourceKind::StaticImage)
    }

    pub fn background(id: impl Into<SourceId>) -> Self {
        Self::new(id, SourceKind::Background)
    }

    pub fn overlay(id: impl Into<SourceId>) -> Self {
        Self::new(id, SourceKind::Overlay)
    }

    /// For live tracks the readiness is the decoder state.
    pub fn decode_state(&self) -> Readiness {
        self.readiness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sources_start_pending() {
        let source = FrameSource::live_track("alice");
        assert_eq!(source.decode_state(), Readiness::Pending);
        assert_eq!(source.kind, SourceKind::LiveTrack);
        assert_eq!(source.id.as_str(), "alice");
    }

    #[test]
    fn source_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SourceId::from("cam-1")).unwrap();
        assert_eq!(json, "\"cam-1\"");
    }
}
