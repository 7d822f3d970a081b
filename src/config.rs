//! Configuration parsing and management for posehud

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::CameraSourceSpec;
use crate::error::{ConfigError, PosehudError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub scheduler: SchedulerConfig,
    pub gesture: GestureConfig,
    pub mood: MoodThresholds,
    pub tracker: TrackerConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PosehudError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, PosehudError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, PosehudError> {
        let paths = [
            PathBuf::from("posehud.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PosehudError> {
        if self.scheduler.target_fps == 0 {
            return Err(invalid("scheduler.target_fps", "Target FPS must be greater than 0"));
        }

        if self.scheduler.fps_window_ms == 0 {
            return Err(invalid("scheduler.fps_window_ms", "FPS window must be greater than 0"));
        }

        if self.scheduler.perception_timeout_ms == 0 {
            return Err(invalid(
                "scheduler.perception_timeout_ms",
                "Perception timeout must be greater than 0",
            ));
        }

        let g = &self.gesture;
        if !(g.min_scale > 0.0 && g.min_scale <= g.max_scale) {
            return Err(invalid(
                "gesture.min_scale",
                "Scale bounds must satisfy 0 < min_scale <= max_scale",
            ));
        }

        if !(g.min_scale..=g.max_scale).contains(&g.initial_scale) {
            return Err(invalid(
                "gesture.initial_scale",
                "Initial scale must lie within [min_scale, max_scale]",
            ));
        }

        if g.pinch_close_threshold < 0.0 || g.pinch_close_threshold > g.pinch_open_threshold {
            return Err(invalid(
                "gesture.pinch_close_threshold",
                "Pinch thresholds must satisfy 0 <= close <= open",
            ));
        }

        if g.scale_step < 0.0 {
            return Err(invalid("gesture.scale_step", "Scale step must not be negative"));
        }

        if let Some(ref source) = self.camera.default_source {
            source.validate()?;
        }

        if self.tracker.auto_launch {
            let path = std::path::Path::new(&self.tracker.tracker_script);
            if !path.exists() {
                tracing::warn!(
                    "Tracker auto_launch enabled but helper script not found at: {}",
                    self.tracker.tracker_script
                );
            }
        }

        if self.http.port == 0 {
            return Err(invalid("http.port", "Port must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> PosehudError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Camera source management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Delay before acquiring a newly selected source, in milliseconds
    pub settle_ms: u64,
    /// Preferred capture width when no device is pinned
    pub ideal_width: u32,
    /// Preferred capture height when no device is pinned
    pub ideal_height: u32,
    /// Preferred facing mode when no device is pinned ("user" or "environment")
    pub facing_mode: String,
    /// How long to wait for the first decodable frame
    pub ready_timeout_ms: u64,
    /// Source selected at startup
    pub default_source: Option<CameraSourceSpec>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            settle_ms: 150,
            ideal_width: 1920,
            ideal_height: 1080,
            facing_mode: "user".to_string(),
            ready_timeout_ms: 10_000,
            default_source: Some(CameraSourceSpec::webcam(None, Some("Default Camera"))),
        }
    }
}

/// Tick loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick cadence, normally the display refresh rate
    pub target_fps: u32,
    /// Per-call timeout for the perception capability
    pub perception_timeout_ms: u64,
    /// FPS sampling window
    pub fps_window_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            perception_timeout_ms: 1000,
            fps_window_ms: 1000,
        }
    }
}

/// Gesture-to-control mapping constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Pinch distance below which the object shrinks
    pub pinch_close_threshold: f32,
    /// Pinch distance above which the object grows
    pub pinch_open_threshold: f32,
    /// Scale change per tick
    pub scale_step: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub initial_scale: f32,
    /// Hand displacement to rotation velocity gain
    pub rotation_gain: f32,
    /// Idle spin before any hand is seen [x, y]
    pub initial_rotation: [f32; 2],
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_close_threshold: 0.05,
            pinch_open_threshold: 0.15,
            scale_step: 0.02,
            min_scale: 0.5,
            max_scale: 2.5,
            initial_scale: 1.0,
            rotation_gain: 0.1,
            initial_rotation: [0.001, 0.003],
        }
    }
}

/// Emotion rule thresholds.
///
/// Rule order and the confidence clamp/floor are fixed; only the numbers move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodThresholds {
    pub happy_min_smile: f32,
    pub happy_max_mouth_ratio: f32,
    pub happy_confidence_scale: f32,
    pub happy_strong_confidence: f32,

    pub surprised_min_eye_open: f32,
    pub surprised_min_mouth_ratio: f32,
    pub surprised_max_brow_height: f32,
    pub surprised_confidence_scale: f32,

    pub sad_max_smile: f32,
    pub sad_max_eye_open: f32,
    pub sad_confidence_scale: f32,

    pub angry_min_brow_height: f32,
    pub angry_max_mouth_ratio: f32,
    pub angry_confidence_scale: f32,

    pub focused_max_eye_open: f32,
    pub focused_max_abs_smile: f32,
    pub focused_max_mouth_ratio: f32,
    pub focused_confidence: f32,

    pub neutral_confidence: f32,
    pub confidence_floor: f32,
}

impl Default for MoodThresholds {
    fn default() -> Self {
        Self {
            happy_min_smile: 0.01,
            happy_max_mouth_ratio: 0.6,
            happy_confidence_scale: 100.0,
            happy_strong_confidence: 0.7,

            surprised_min_eye_open: 0.03,
            surprised_min_mouth_ratio: 0.8,
            surprised_max_brow_height: -0.02,
            surprised_confidence_scale: 0.5,

            sad_max_smile: -0.005,
            sad_max_eye_open: 0.025,
            sad_confidence_scale: 80.0,

            angry_min_brow_height: 0.005,
            angry_max_mouth_ratio: 0.4,
            angry_confidence_scale: 100.0,

            focused_max_eye_open: 0.022,
            focused_max_abs_smile: 0.005,
            focused_max_mouth_ratio: 0.5,
            focused_confidence: 0.8,

            neutral_confidence: 0.7,
            confidence_floor: 0.3,
        }
    }
}

/// External tracker helper (camera capture + inference)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// UDP port to receive observation packets on
    pub port: u16,
    /// Listen address for the UDP socket
    pub listen_address: String,
    /// Launch the helper script as a child process per stream
    pub auto_launch: bool,
    /// Path to the helper script
    pub tracker_script: String,
    /// Interpreter used for the helper script
    pub python: String,
    /// Capture FPS requested from the helper
    pub capture_fps: u32,
    /// Directory the helper caches model files in
    pub model_dir: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            port: 12347,
            listen_address: "127.0.0.1".to_string(),
            auto_launch: true,
            tracker_script: "scripts/hud_tracker.py".to_string(),
            python: "python3".to_string(),
            capture_fps: 30,
            model_dir: ".".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable HTTP server
    pub enabled: bool,
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8090,
            cors_enabled: true,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("posehud");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/posehud");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/posehud");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("posehud");
        }
    }

    PathBuf::from(".")
}
