//! MediaPipe tracker helper adapter
//!
//! Receives JSON-over-UDP packets from the `scripts/hud_tracker.py` helper.
//! One helper process and one receiver socket exist per stream; both are owned
//! by the stream handle. Packets land in a shared [`TrackerFeed`] that serves
//! both the camera side (frame availability, playback errors) and the
//! perception side (face box, face mesh, hand skeleton).

use async_trait::async_trait;
use glam::Vec3;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::subprocess::TrackerSubprocess;
use crate::camera::{CameraBackend, DeviceInfo, Frame, StreamHandle, VideoRequest};
use crate::config::TrackerConfig;
use crate::error::{CameraError, PerceptionError, PosehudError, TrackingError};
use crate::perception::{
    FaceDetection, FaceLandmarks, HandLandmarks, Handedness, PerceptionBackend, Timestamp,
};

/// Packets kept around for perception lookups by frame sequence
const PACKET_HISTORY: usize = 8;

/// Where capture nodes are enumerated from
const V4L_SYSFS_DIR: &str = "/sys/class/video4linux";

/// A single JSON packet from the tracker helper
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerPacket {
    /// Frame sequence number assigned by the helper
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Capture failure reported instead of a frame
    #[serde(default)]
    pub error: Option<PacketError>,
    /// Face box in normalized coordinates
    #[serde(default)]
    pub face: Option<FaceDetection>,
    /// 468-point face mesh, [x, y, z] per point
    #[serde(default)]
    pub face_landmarks: Option<Vec<[f32; 3]>>,
    /// Expression coefficients by name (0.0–1.0)
    #[serde(default)]
    pub blendshapes: Option<HashMap<String, f32>>,
    #[serde(default)]
    pub hand: Option<PacketHand>,
}

/// Capture failure carried by an error packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PacketError {
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Hand entry of a packet
#[derive(Debug, Clone, Deserialize)]
pub struct PacketHand {
    pub landmarks: Vec<[f32; 3]>,
    /// "Left" or "Right"
    #[serde(default)]
    pub handedness: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

impl PacketError {
    /// Map the helper's error kind onto the camera error taxonomy
    pub fn to_camera_error(&self) -> CameraError {
        match self.kind.as_str() {
            "permission_denied" => CameraError::PermissionDenied,
            "device_not_found" => CameraError::DeviceNotFound,
            "device_busy" => CameraError::DeviceBusy,
            "stream" => CameraError::NetworkOrStream(self.message.clone()),
            other => CameraError::NetworkOrStream(format!("{} ({})", self.message, other)),
        }
    }
}

impl TrackerPacket {
    /// Whether the packet carries a decodable frame
    pub fn has_frame(&self) -> bool {
        self.error.is_none() && self.width > 0 && self.height > 0
    }

    pub fn face_landmarks(&self) -> Option<FaceLandmarks> {
        self.face_landmarks.as_ref().map(|points| FaceLandmarks {
            points: points.iter().map(|p| Vec3::from_array(*p)).collect(),
            blendshapes: self.blendshapes.clone(),
        })
    }

    pub fn hand_landmarks(&self) -> Option<HandLandmarks> {
        self.hand.as_ref().map(|hand| HandLandmarks {
            points: hand.landmarks.iter().map(|p| Vec3::from_array(*p)).collect(),
            handedness: hand.handedness.as_ref().map(|label| Handedness {
                label: label.clone(),
                score: hand.score.unwrap_or(0.0),
            }),
        })
    }
}

/// Latest packets received from the helper
#[derive(Debug, Default)]
pub struct FeedState {
    packets: VecDeque<Arc<TrackerPacket>>,
    received_at: Option<Instant>,
    error: Option<CameraError>,
}

impl FeedState {
    /// Most recent frame-carrying packet
    pub fn latest(&self) -> Option<&Arc<TrackerPacket>> {
        self.packets.back()
    }

    pub fn find(&self, seq: u64) -> Option<&Arc<TrackerPacket>> {
        self.packets.iter().rev().find(|p| p.seq == seq)
    }

    pub fn error(&self) -> Option<&CameraError> {
        self.error.as_ref()
    }
}

/// Shared packet feed between the stream handle and the perception backend
#[derive(Clone)]
pub struct TrackerFeed {
    tx: Arc<watch::Sender<FeedState>>,
}

impl Default for TrackerFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(FeedState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Store a packet from the helper
    pub fn publish(&self, packet: TrackerPacket) {
        self.tx.send_modify(|state| {
            if let Some(error) = &packet.error {
                state.error = Some(error.to_camera_error());
                return;
            }
            if !packet.has_frame() {
                return;
            }
            if state.packets.len() == PACKET_HISTORY {
                state.packets.pop_front();
            }
            state.packets.push_back(Arc::new(packet));
            state.received_at = Some(Instant::now());
        });
    }

    /// Forget everything from the previous stream
    pub fn reset(&self) {
        self.tx.send_replace(FeedState::default());
    }

    pub fn take_error(&self) -> Option<CameraError> {
        let mut error = None;
        self.tx.send_if_modified(|state| {
            error = state.error.take();
            error.is_some()
        });
        error
    }

    pub fn current_frame(&self) -> Option<Frame> {
        let state = self.tx.borrow();
        let packet = state.latest()?;
        Some(Frame {
            sequence: packet.seq,
            width: packet.width,
            height: packet.height,
            captured_at: state.received_at.unwrap_or_else(Instant::now),
        })
    }

    pub fn packet(&self, seq: u64) -> Option<Arc<TrackerPacket>> {
        self.tx.borrow().find(seq).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.tx.subscribe()
    }
}

/// Tracker helper JSON-over-UDP receiver
pub struct MpReceiver {
    socket: UdpSocket,
    feed: TrackerFeed,
}

impl MpReceiver {
    /// Bind the UDP socket
    pub async fn bind(config: &TrackerConfig, feed: TrackerFeed) -> Result<Self, PosehudError> {
        let addr = format!("{}:{}", config.listen_address, config.port);

        let socket = UdpSocket::bind(&addr).await.map_err(|e| {
            TrackingError::Receiver(format!("Failed to bind to {}: {}", addr, e))
        })?;

        tracing::info!("Tracker receiver listening on {}", addr);
        Ok(Self { socket, feed })
    }

    /// Receive and store one packet
    pub async fn process(&self) -> Result<(), PosehudError> {
        let mut buf = vec![0u8; 65536];

        let size = self
            .socket
            .recv(&mut buf)
            .await
            .map_err(|e| TrackingError::Receiver(format!("Receive error: {}", e)))?;

        let packet: TrackerPacket = serde_json::from_slice(&buf[..size])
            .map_err(|e| TrackingError::Parse(format!("JSON parse error: {}", e)))?;

        self.feed.publish(packet);
        Ok(())
    }

    /// Receive until the task is aborted
    pub async fn run(self) {
        loop {
            match self.process().await {
                Ok(()) => {}
                Err(PosehudError::Tracking(TrackingError::Parse(e))) => {
                    tracing::debug!("Dropping tracker packet: {}", e);
                }
                Err(e) => {
                    tracing::error!("Tracker receive error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// One helper-backed stream: child process plus receiver task
pub struct MpStream {
    description: String,
    subprocess: Option<TrackerSubprocess>,
    receiver: JoinHandle<()>,
    feed: TrackerFeed,
}

#[async_trait]
impl StreamHandle for MpStream {
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn wait_ready(&mut self) -> Result<(), CameraError> {
        let mut rx = self.feed.subscribe();
        loop {
            if let Some(error) = self.feed.take_error() {
                return Err(error);
            }
            if rx.borrow_and_update().latest().is_some() {
                return Ok(());
            }
            if let Some(sp) = self.subprocess.as_mut() {
                if !sp.is_running() {
                    return Err(CameraError::Backend("tracker helper exited".to_string()));
                }
            }

            tokio::select! {
                _ = rx.changed() => {}
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
        }
    }

    fn current_frame(&self) -> Option<Frame> {
        self.feed.current_frame()
    }

    fn poll_error(&mut self) -> Option<CameraError> {
        if let Some(error) = self.feed.take_error() {
            return Some(error);
        }
        let exited = self
            .subprocess
            .as_mut()
            .map_or(false, |sp| !sp.is_running());
        if exited {
            self.subprocess = None;
            return Some(CameraError::NetworkOrStream("tracker helper exited".to_string()));
        }
        None
    }

    async fn stop(&mut self) {
        self.receiver.abort();
        if let Some(sp) = self.subprocess.as_mut() {
            sp.stop().await;
        }
        self.subprocess = None;
        self.feed.reset();
        tracing::info!("Tracker stream stopped: {}", self.description);
    }
}

impl Drop for MpStream {
    fn drop(&mut self) {
        // The child is killed by its own drop
        self.receiver.abort();
    }
}

/// Camera backend that delegates capture to the tracker helper
pub struct MpCameraBackend {
    config: TrackerConfig,
    feed: TrackerFeed,
}

impl MpCameraBackend {
    pub fn new(config: &TrackerConfig, feed: TrackerFeed) -> Self {
        Self {
            config: config.clone(),
            feed,
        }
    }
}

#[async_trait]
impl CameraBackend for MpCameraBackend {
    fn name(&self) -> &'static str {
        "mediapipe"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        list_v4l_devices(Path::new(V4L_SYSFS_DIR)).await
    }

    async fn open(&self, request: &VideoRequest) -> Result<Box<dyn StreamHandle>, CameraError> {
        self.feed.reset();

        let receiver = MpReceiver::bind(&self.config, self.feed.clone())
            .await
            .map_err(|e| CameraError::Backend(e.to_string()))?;

        let subprocess = if self.config.auto_launch {
            let mut sp = TrackerSubprocess::new(&self.config);
            sp.start(request)
                .map_err(|e| CameraError::Backend(e.to_string()))?;
            Some(sp)
        } else {
            tracing::info!("Tracker auto-launch disabled, expecting an external helper");
            None
        };

        Ok(Box::new(MpStream {
            description: format!("mediapipe {}", request),
            subprocess,
            receiver: tokio::spawn(receiver.run()),
            feed: self.feed.clone(),
        }))
    }
}

/// Enumerate capture nodes under a video4linux sysfs directory.
///
/// The helper opens a device by its node number, so that is the device id.
async fn list_v4l_devices(sysfs: &Path) -> Result<Vec<DeviceInfo>, CameraError> {
    let mut entries = match tokio::fs::read_dir(sysfs).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CameraError::Backend(format!(
                "cannot list video devices in {}: {}",
                sysfs.display(),
                e
            )))
        }
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CameraError::Backend(e.to_string()))?
    {
        let Some(number) = entry.file_name().to_str().and_then(video_node_number) else {
            continue;
        };
        let dir = entry.path();

        // Metadata nodes of the same camera carry a non-zero index
        if let Ok(index) = tokio::fs::read_to_string(dir.join("index")).await {
            if index.trim() != "0" {
                continue;
            }
        }

        let label = match tokio::fs::read_to_string(dir.join("name")).await {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("Video device {}", number),
        };
        found.push((number, label));
    }

    found.sort_by_key(|(number, _)| *number);
    Ok(found
        .into_iter()
        .map(|(number, label)| DeviceInfo {
            device_id: number.to_string(),
            label,
        })
        .collect())
}

fn video_node_number(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

/// Perception backend reading inference results from the helper feed
pub struct MpPerception {
    feed: TrackerFeed,
    last_timestamp: Option<Timestamp>,
}

impl MpPerception {
    pub fn new(feed: TrackerFeed) -> Self {
        Self {
            feed,
            last_timestamp: None,
        }
    }

    fn packet_for(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Arc<TrackerPacket>, PerceptionError> {
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                return Err(PerceptionError::DetectorInvocation(format!(
                    "timestamp {} ms went backwards (last {} ms)",
                    timestamp.as_millis(),
                    previous.as_millis()
                )));
            }
        }
        self.last_timestamp = Some(timestamp);

        self.feed.packet(frame.sequence).ok_or_else(|| {
            PerceptionError::DetectorInvocation(format!(
                "frame {} is no longer available",
                frame.sequence
            ))
        })
    }
}

#[async_trait]
impl PerceptionBackend for MpPerception {
    fn name(&self) -> &'static str {
        "mediapipe"
    }

    async fn detect_faces(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceDetection>, PerceptionError> {
        Ok(self.packet_for(frame, timestamp)?.face)
    }

    async fn detect_face_landmarks(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceLandmarks>, PerceptionError> {
        Ok(self.packet_for(frame, timestamp)?.face_landmarks())
    }

    async fn detect_hands(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<HandLandmarks>, PerceptionError> {
        Ok(self.packet_for(frame, timestamp)?.hand_landmarks())
    }

    async fn close(&mut self) {
        self.feed.reset();
    }
}
