//! Error types for posehud

use thiserror::Error;

/// Main error type for posehud
#[derive(Error, Debug)]
pub enum PosehudError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Web server error: {0}")]
    Web(#[from] WebError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    UnsupportedInput(#[from] UnsupportedInputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera acquisition errors.
///
/// All of these are terminal for the session: the camera manager moves to
/// the error state and waits for a new explicit source selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera access denied. Allow camera access in the system settings.")]
    PermissionDenied,

    #[error("Camera not found. Check that the device is connected.")]
    DeviceNotFound,

    #[error("Camera is busy in another application.")]
    DeviceBusy,

    #[error("Could not connect to the stream: {0}")]
    NetworkOrStream(String),

    #[error("Invalid camera source: {0}")]
    InvalidSource(String),

    #[error("Camera backend failure: {0}")]
    Backend(String),
}

impl CameraError {
    /// Stable machine-readable kind, used in API responses
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => "permission_denied",
            CameraError::DeviceNotFound => "device_not_found",
            CameraError::DeviceBusy => "device_busy",
            CameraError::NetworkOrStream(_) => "network_or_stream",
            CameraError::InvalidSource(_) => "invalid_source",
            CameraError::Backend(_) => "backend",
        }
    }
}

/// Perception capability errors (recovered per tick)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PerceptionError {
    #[error("Detector invocation failed: {0}")]
    DetectorInvocation(String),

    #[error("Detector call timed out after {0} ms")]
    Timeout(u64),

    #[error("Perception initialization failed: {0}")]
    Init(String),

    #[error("Perception capability used before init")]
    NotInitialized,

    #[error("Perception capability already disposed")]
    Disposed,

    #[error("Perception capability still leased by {0} session(s)")]
    InUse(usize),
}

/// Landmark input of the wrong shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported landmark input: expected {expected} points, got {actual}")]
pub struct UnsupportedInputError {
    pub expected: usize,
    pub actual: usize,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("Server startup failed: {0}")]
    Startup(String),
}

/// Tracker helper errors (subprocess + UDP feed)
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Tracker receiver error: {0}")]
    Receiver(String),

    #[error("Tracker packet parse error: {0}")]
    Parse(String),

    #[error("Tracker subprocess error: {0}")]
    Subprocess(String),
}

/// Result type alias for posehud operations
pub type Result<T> = std::result::Result<T, PosehudError>;
