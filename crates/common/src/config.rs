//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{LivemixError, LivemixResult};

/// Largest accepted canvas side, in pixels.
pub const MAX_CANVAS_DIMENSION: u32 = 8192;

/// Highest accepted output frame rate.
pub const MAX_FPS: u32 = 240;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where extracted clips are written by the CLI.
    pub clips_dir: PathBuf,

    /// Default output canvas.
    pub canvas: CanvasDefaults,

    /// Rolling buffer settings.
    pub buffer: BufferConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default output canvas parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasDefaults {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Target frame rate.
    pub fps: u32,
}

/// Rolling buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// How many seconds of composed output to retain.
    pub retention_secs: f64,

    /// Nominal length of one buffer segment.
    pub segment_secs: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "livemix=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clips_dir: dirs_default_clips(),
            canvas: CanvasDefaults::default(),
            buffer: BufferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CanvasDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            retention_secs: 60.0,
            segment_secs: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CanvasDefaults {
    /// Check that the canvas can back a render target.
    pub fn validate(&self) -> LivemixResult<()> {
        validate_canvas(self.width, self.height, self.fps)
    }
}

impl BufferConfig {
    /// Check retention and segment length.
    pub fn validate(&self) -> LivemixResult<()> {
        if !self.segment_secs.is_finite() || self.segment_secs <= 0.0 {
            return Err(LivemixError::config(format!(
                "segment_secs must be positive, got {}",
                self.segment_secs
            )));
        }
        if !self.retention_secs.is_finite() || self.retention_secs < self.segment_secs {
            return Err(LivemixError::config(format!(
                "retention_secs ({}) must be at least segment_secs ({})",
                self.retention_secs, self.segment_secs
            )));
        }
        Ok(())
    }
}

/// Validate render target parameters.
pub fn validate_canvas(width: u32, height: u32, fps: u32) -> LivemixResult<()> {
    if width == 0 || height == 0 {
        return Err(LivemixError::target_unavailable(format!(
            "canvas must be non-empty, got {width}x{height}"
        )));
    }
    if width > MAX_CANVAS_DIMENSION || height > MAX_CANVAS_DIMENSION {
        return Err(LivemixError::target_unavailable(format!(
            "canvas {width}x{height} exceeds {MAX_CANVAS_DIMENSION}px limit"
        )));
    }
    if fps == 0 || fps > MAX_FPS {
        return Err(LivemixError::target_unavailable(format!(
            "fps must be within 1..={MAX_FPS}, got {fps}"
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => match config.validate() {
                        Ok(()) => return config,
                        Err(e) => {
                            tracing::warn!("Ignoring invalid config at {:?}: {}", config_path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Validate every section.
    pub fn validate(&self) -> LivemixResult<()> {
        self.canvas.validate()?;
        self.buffer.validate()
    }

    /// Where `load`/`save` look for the config file.
    pub fn path() -> PathBuf {
        config_file_path()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("livemix").join("config.json")
}

/// Default clips directory.
fn dirs_default_clips() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("livemix").join("clips")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.buffer.retention_secs, 60.0);
        assert_eq!(config.canvas.fps, 30);
    }

    #[test]
    fn canvas_validation_rejects_degenerate_targets() {
        assert!(validate_canvas(0, 720, 30).is_err());
        assert!(validate_canvas(1280, 720, 0).is_err());
        assert!(validate_canvas(MAX_CANVAS_DIMENSION + 1, 720, 30).is_err());
        let err = validate_canvas(1280, 720, 1000).unwrap_err();
        assert!(matches!(err, LivemixError::RenderTargetUnavailable { .. }));
    }

    #[test]
    fn buffer_validation_requires_retention_to_cover_a_segment() {
        let bad = BufferConfig {
            retention_secs: 0.5,
            segment_secs: 1.0,
        };
        assert!(bad.validate().is_err());

        let zero_segment = BufferConfig {
            retention_secs: 10.0,
            segment_secs: 0.0,
        };
        assert!(zero_segment.validate().is_err());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.canvas.width, config.canvas.width);
        assert_eq!(parsed.buffer.segment_secs, config.buffer.segment_secs);
    }
}
