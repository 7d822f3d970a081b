//! Camera source module
//!
//! Owns the lifecycle of the single live video stream:
//! - Source selection values and acquisition requests
//! - Backend/stream traits implemented by capture adapters
//! - The manager enforcing teardown-then-acquire on every switch

pub mod manager;
pub mod source;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;

use crate::error::CameraError;

pub use manager::{CameraManager, CameraStatus, SelectOutcome};
pub use source::{CameraSourceSpec, SourceKind, VideoRequest};

/// Reference to the currently decodable frame of the live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic frame number assigned by the stream
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// When the frame became available
    pub captured_at: Instant,
}

/// A video input the backend can open by `device_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
}

/// Opens video streams for acquisition requests
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Video inputs currently attached. Backends that cannot enumerate
    /// report none.
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(Vec::new())
    }

    /// Acquire a stream.
    ///
    /// Dropping the returned future before it resolves must release anything
    /// it acquired so far.
    async fn open(&self, request: &VideoRequest) -> Result<Box<dyn StreamHandle>, CameraError>;
}

/// A live video stream.
///
/// Exclusively owned by [`CameraManager`]. Implementations must release their
/// device, sockets and child processes on `Drop` as well as on `stop`.
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Resolve once the first decodable frame is available
    async fn wait_ready(&mut self) -> Result<(), CameraError>;

    /// Latest decodable frame, if any
    fn current_frame(&self) -> Option<Frame>;

    /// Asynchronous playback failure reported since the last poll
    fn poll_error(&mut self) -> Option<CameraError>;

    /// Stop all tracks, clear handlers and cancel pending timers
    async fn stop(&mut self);
}

/// Read side of the camera used by the tick loop
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// The current frame when one is decodable, `None` otherwise
    async fn current_frame(&self) -> Option<Frame>;
}
