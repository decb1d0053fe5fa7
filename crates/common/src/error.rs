//! Error types shared across livemix crates.

/// Top-level error type for livemix operations.
#[derive(Debug, thiserror::Error)]
pub enum LivemixError {
    #[error("Source '{source_id}' could not be decoded: {message}")]
    SourceDecodeFailure { source_id: String, message: String },

    #[error("Render target unavailable: {message}")]
    RenderTargetUnavailable { message: String },

    #[error(
        "Insufficient buffer: requested {requested_secs:.2}s but only {available_secs:.2}s is buffered"
    )]
    InsufficientBuffer {
        requested_secs: f64,
        available_secs: f64,
    },

    #[error("Invalid clip request: {message}")]
    InvalidClipRequest { message: String },

    #[error("Pipeline not initialized: {message}")]
    NotInitialized { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Layout error: {message}")]
    Layout { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Control channel error: {message}")]
    Control { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LivemixError.
pub type LivemixResult<T> = Result<T, LivemixError>;

impl LivemixError {
    pub fn source_decode(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceDecodeFailure {
            source_id: source_id.into(),
            message: msg.into(),
        }
    }

    pub fn target_unavailable(msg: impl Into<String>) -> Self {
        Self::RenderTargetUnavailable {
            message: msg.into(),
        }
    }

    pub fn insufficient_buffer(requested_secs: f64, available_secs: f64) -> Self {
        Self::InsufficientBuffer {
            requested_secs,
            available_secs,
        }
    }

    pub fn invalid_clip(msg: impl Into<String>) -> Self {
        Self::InvalidClipRequest {
            message: msg.into(),
        }
    }

    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn control(msg: impl Into<String>) -> Self {
        Self::Control {
            message: msg.into(),
        }
    }

    /// Whether the caller can retry the same operation later (or with
    /// different parameters) without tearing anything down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceDecodeFailure { .. }
                | Self::InsufficientBuffer { .. }
                | Self::InvalidClipRequest { .. }
                | Self::NotInitialized { .. }
                | Self::RenderTargetUnavailable { .. }
        )
    }
}
