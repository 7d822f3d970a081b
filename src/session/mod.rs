//! Aggregated session state
//!
//! The scheduler owns a [`TrackingSession`] and publishes copies of its
//! [`SessionSnapshot`]; consumers only ever see snapshots.

use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::gesture::{GestureControlState, GestureController, GestureMemory};
use crate::mood::{MoodClassifier, MoodState};
use crate::tracking::observation::{FaceObservation, HandObservation, RawObservations};

/// Coarse session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for the camera and the first successful tick
    #[default]
    Initializing,
    /// Producing observations
    Active,
    /// Camera failed; waiting for a new source selection
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Initializing => write!(f, "initializing"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Everything a consumer can read about the session at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Number of successfully applied ticks
    tick: u64,
    face: Option<FaceObservation>,
    hand: Option<HandObservation>,
    mood: MoodState,
    fps: u32,
    status: SessionStatus,
    control: GestureControlState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::new(GestureControlState::default())
    }
}

impl SessionSnapshot {
    pub fn new(control: GestureControlState) -> Self {
        Self {
            tick: 0,
            face: None,
            hand: None,
            mood: MoodState::analyzing(),
            fps: 0,
            status: SessionStatus::Initializing,
            control,
            error_message: None,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn face(&self) -> Option<&FaceObservation> {
        self.face.as_ref()
    }

    pub fn hand(&self) -> Option<&HandObservation> {
        self.hand.as_ref()
    }

    pub fn mood(&self) -> &MoodState {
        &self.mood
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn control(&self) -> GestureControlState {
        self.control
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Mark the session active. An errored session stays errored.
    pub fn with_active(mut self) -> Self {
        if self.status == SessionStatus::Initializing {
            self.status = SessionStatus::Active;
        }
        self
    }

    /// Move to the error state with a user-facing message.
    ///
    /// Observations are dropped since they no longer describe a live frame;
    /// mood and gesture control are kept.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.status = SessionStatus::Error;
        self.face = None;
        self.hand = None;
        self.error_message = Some(message.into());
        self
    }

    /// Explicit reload after a new source selection
    pub fn with_reload(mut self) -> Self {
        self.status = SessionStatus::Initializing;
        self.error_message = None;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

/// Scheduler-owned mutable session state
#[derive(Debug, Clone)]
pub struct TrackingSession {
    snapshot: SessionSnapshot,
    gesture: GestureMemory,
}

impl TrackingSession {
    pub fn new(config: &GestureConfig) -> Self {
        let gesture = GestureMemory::new(config);
        Self {
            snapshot: SessionSnapshot::new(gesture.control()),
            gesture,
        }
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn gesture(&self) -> &GestureMemory {
        &self.gesture
    }

    /// Fold one successful tick into the session
    pub fn apply(
        &mut self,
        raw: RawObservations,
        classifier: &MoodClassifier,
        controller: &GestureController,
    ) {
        let snapshot = &mut self.snapshot;

        snapshot.face = raw
            .detection
            .as_ref()
            .map(|detection| FaceObservation::new(detection, raw.landmarks.as_ref()));

        // Mood is only re-evaluated when the landmarker saw a face
        if let Some(landmarks) = &raw.landmarks {
            snapshot.mood = classifier.classify(&landmarks.points);
        }

        snapshot.hand = raw.hand.as_ref().and_then(HandObservation::from_landmarks);
        controller.update(&mut self.gesture, snapshot.hand.as_ref());
        snapshot.control = self.gesture.control();

        snapshot.tick += 1;
        if snapshot.status == SessionStatus::Initializing {
            snapshot.status = SessionStatus::Active;
        }
    }

    /// Replace the snapshot through one of its `with_*` transitions
    pub fn update_snapshot(&mut self, f: impl FnOnce(SessionSnapshot) -> SessionSnapshot) {
        let current = std::mem::take(&mut self.snapshot);
        self.snapshot = f(current);
    }
}
