//! Control protocol between the control plane and the render worker.
//!
//! [`ControlMessage`] and [`ControlEvent`] are the serializable wire types
//! (`{"type": "...", ...}`, camelCase fields). [`Command`] is what actually
//! travels over the worker's channel: wire messages plus the out-of-band
//! operations that carry non-serializable payloads.

use serde::{Deserialize, Serialize};

use livemix_common::clock::duration_ms;
use livemix_common::error::{LivemixError, LivemixResult};
use livemix_layout_model::layout::{BackgroundRef, RawLayout, RawOverlay, RawPosition};
use livemix_layout_model::source::{FrameSource, SourceId};
use livemix_render_engine::sources::FrameFeed;

use crate::scheduler::TickTiming;

/// Inbound control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Allocate the render target. Must precede everything else.
    #[serde(rename_all = "camelCase")]
    Init {
        target_width: u32,
        target_height: u32,
        fps: u32,
    },
    /// Start (or keep) rendering. Omitted fields keep their previous value.
    ///
    /// `layout` here is the bare array of positions, with background and
    /// overlays as sibling fields:
    /// `{"type": "render", "layout": [{"sourceId": ...}], "background": ...}`.
    Render {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layout: Option<Vec<RawPosition>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        background: Option<BackgroundRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overlays: Option<Vec<RawOverlay>>,
    },
    /// Replace the whole layout, effective from the next tick.
    ///
    /// Unlike `render`, `layout` is a complete layout object:
    /// `{"type": "updateLayout", "layout": {"positions": [...], "background": ...}}`.
    /// Fields missing from it reset to their defaults.
    UpdateLayout { layout: RawLayout },
    Stop,
}

impl ControlMessage {
    pub fn from_json(json: &str) -> LivemixResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LivemixError::control(format!("Invalid control message: {e}")))
    }

    pub fn to_json(&self) -> LivemixResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Render { .. } => "render",
            Self::UpdateLayout { .. } => "updateLayout",
            Self::Stop => "stop",
        }
    }
}

/// Outbound notification from the render worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlEvent {
    Initialized { width: u32, height: u32, fps: u32 },
    /// Per-tick telemetry. All times in milliseconds.
    #[serde(rename_all = "camelCase")]
    FrameRendered {
        sequence: u64,
        timestamp: f64,
        frame_time: f64,
        since_last_frame: Option<f64>,
    },
    /// Non-fatal, per-operation failure.
    Error { message: String },
    Stopped,
}

impl ControlEvent {
    pub fn error(err: &LivemixError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    pub(crate) fn frame_rendered(tick: &TickTiming, frame_time: std::time::Duration) -> Self {
        Self::FrameRendered {
            sequence: tick.sequence,
            timestamp: duration_ms(tick.timestamp),
            frame_time: duration_ms(frame_time),
            since_last_frame: tick.since_last.map(duration_ms),
        }
    }

    pub fn to_json(&self) -> LivemixResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Everything the render worker accepts.
pub enum Command {
    Message(ControlMessage),
    AddSource {
        source: FrameSource,
        feed: Box<dyn FrameFeed>,
    },
    RemoveSource(SourceId),
    /// Stop (if needed) and exit the worker loop.
    Shutdown,
}

impl From<ControlMessage> for Command {
    fn from(message: ControlMessage) -> Self {
        Command::Message(message)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Command::AddSource { source, .. } => {
                f.debug_struct("AddSource").field("source", source).finish()
            }
            Command::RemoveSource(id) => f.debug_tuple("RemoveSource").field(id).finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}
