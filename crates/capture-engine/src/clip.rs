//! Clip extraction from buffer snapshots.
//!
//! Extraction is read-only: it copies frame handles out of a snapshot and
//! never touches the live ring. Clips are tail-anchored ("the last N
//! seconds") and start on a frame boundary: the first frame of a clip is
//! the newest frame at or before `end - N`, so a clip never covers less than
//! what was asked for and at most one frame more.

use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use livemix_common::error::{LivemixError, LivemixResult};

use crate::ring::{BufferSnapshot, EncodedFrame};

/// Slack when comparing a request against the buffered duration, so that
/// asking for exactly what `buffered_duration` reported always succeeds.
const DURATION_TOLERANCE: Duration = Duration::from_micros(1);

/// A request for the most recent `requested_secs` of output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    pub requested_secs: f64,
}

impl ClipRequest {
    pub fn new(requested_secs: f64) -> Self {
        Self { requested_secs }
    }

    /// The requested length. Non-positive and non-finite values are rejected.
    pub fn duration(&self) -> LivemixResult<Duration> {
        let secs = self.requested_secs;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(LivemixError::invalid_clip(format!(
                "clip duration must be a positive number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| LivemixError::invalid_clip(format!("clip duration out of range: {e}")))
    }
}

impl From<f64> for ClipRequest {
    fn from(requested_secs: f64) -> Self {
        Self::new(requested_secs)
    }
}

/// A finished clip. Owned by the caller; independent of the buffer.
#[derive(Debug, Clone)]
pub struct ClipArtifact {
    pub requested: Duration,
    /// Timestamp of the first frame.
    pub start: Duration,
    /// End of the covered range (end of the newest frame).
    pub end: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: String,
    pub frames: Vec<EncodedFrame>,
}

impl ClipArtifact {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(|f| f.data.len()).sum()
    }

    /// Describe the clip, with each frame's offset into the payload written
    /// by [`ClipArtifact::write_payload`].
    pub fn manifest(&self) -> ClipManifest {
        let mut offset = 0u64;
        let frames = self
            .frames
            .iter()
            .map(|f| {
                let entry = ClipFrameEntry {
                    timestamp_secs: f.timestamp.saturating_sub(self.start).as_secs_f64(),
                    offset,
                    len: f.data.len() as u64,
                };
                offset += f.data.len() as u64;
                entry
            })
            .collect();
        ClipManifest {
            requested_secs: self.requested.as_secs_f64(),
            start_secs: self.start.as_secs_f64(),
            end_secs: self.end.as_secs_f64(),
            duration_secs: self.duration().as_secs_f64(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            format: self.format.clone(),
            frame_count: self.frames.len(),
            frames,
        }
    }

    /// Write every frame's payload back to back, oldest first.
    pub fn write_payload<W: Write>(&self, mut writer: W) -> LivemixResult<()> {
        for frame in &self.frames {
            writer.write_all(&frame.data)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Serializable description of a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipManifest {
    pub requested_secs: f64,
    pub start_secs: f64,
    pub end_secs: f64,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: String,
    pub frame_count: usize,
    pub frames: Vec<ClipFrameEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipFrameEntry {
    /// Seconds from the start of the clip.
    pub timestamp_secs: f64,
    /// Byte offset into the payload.
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClipExtractor;

impl ClipExtractor {
    /// Cut the last `request.requested_secs` out of `snapshot`.
    ///
    /// Fails with `InvalidClipRequest` for non-positive or non-finite
    /// durations and with `InsufficientBuffer` (carrying the available
    /// seconds) when the snapshot holds less than requested.
    pub fn extract(
        snapshot: &BufferSnapshot,
        request: impl Into<ClipRequest>,
    ) -> LivemixResult<ClipArtifact> {
        let request = request.into();
        let duration_secs = request.requested_secs;
        let requested = request.duration()?;

        let available = snapshot.buffered_duration();
        if requested > available + DURATION_TOLERANCE {
            return Err(LivemixError::insufficient_buffer(
                duration_secs,
                available.as_secs_f64(),
            ));
        }
        let end = snapshot
            .end()
            .ok_or_else(|| LivemixError::insufficient_buffer(duration_secs, 0.0))?;
        let cut = end.saturating_sub(requested);

        let frames: Vec<&EncodedFrame> = snapshot.frames().collect();
        let first = frames
            .partition_point(|f| f.timestamp <= cut)
            .saturating_sub(1);
        let frames: Vec<EncodedFrame> = frames[first..].iter().map(|&f| f.clone()).collect();
        let start = frames.first().map_or(cut, |f| f.timestamp);

        let info = snapshot.info();
        tracing::info!(
            requested_secs = duration_secs,
            available_secs = available.as_secs_f64(),
            frames = frames.len(),
            "Clip extracted"
        );
        Ok(ClipArtifact {
            requested,
            start,
            end,
            width: info.width,
            height: info.height,
            fps: info.fps,
            format: info.format.clone(),
            frames,
        })
    }
}

/// Free-function form of [`ClipExtractor::extract`].
pub fn extract(
    snapshot: &BufferSnapshot,
    request: impl Into<ClipRequest>,
) -> LivemixResult<ClipArtifact> {
    ClipExtractor::extract(snapshot, request)
}
