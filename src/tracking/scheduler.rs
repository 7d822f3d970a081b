//! Per-tick tracking loop
//!
//! Each tick reads the current frame, runs the three perception calls in
//! order and folds the results into the session. A failed or timed-out call
//! skips the tick and leaves the published state untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::fps::FpsCounter;
use super::observation::RawObservations;
use crate::camera::{CameraStatus, Frame, FrameSource};
use crate::config::Config;
use crate::error::PerceptionError;
use crate::gesture::GestureController;
use crate::mood::MoodClassifier;
use crate::perception::{PerceptionLease, Timestamp};
use crate::session::{SessionSnapshot, SessionStatus, TrackingSession};
use crate::AppState;

/// Cooperative stop flag for one tracking session
#[derive(Clone, Default)]
pub struct LivenessToken {
    inner: Arc<LivenessInner>,
}

#[derive(Default)]
struct LivenessInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl LivenessToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop the session. Idempotent.
    pub fn cancel(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolve once the token has been cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_alive() {
                return;
            }
            notified.await;
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was torn down
    Stopped,
    /// No new decodable frame; perception was not invoked
    NotReady,
    /// Observations were applied
    Updated,
    /// A perception call failed; previous state retained
    Failed,
}

pub struct TrackingScheduler {
    frames: Arc<dyn FrameSource>,
    camera_status: watch::Receiver<CameraStatus>,
    perception: PerceptionLease,
    classifier: MoodClassifier,
    controller: GestureController,
    session: TrackingSession,
    fps: FpsCounter,
    target_fps: u32,
    call_timeout: Duration,
    liveness: LivenessToken,
    started: Instant,
    last_timestamp: Option<Timestamp>,
    /// Sequence of the last frame that was applied
    last_sequence: Option<u64>,
    dirty: bool,
}

impl TrackingScheduler {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        camera_status: watch::Receiver<CameraStatus>,
        perception: PerceptionLease,
        config: &Config,
        liveness: LivenessToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            frames,
            camera_status,
            perception,
            classifier: MoodClassifier::new(config.mood.clone()),
            controller: GestureController::new(&config.gesture),
            session: TrackingSession::new(&config.gesture),
            fps: FpsCounter::new(Duration::from_millis(config.scheduler.fps_window_ms), now),
            target_fps: config.scheduler.target_fps.max(1),
            call_timeout: Duration::from_millis(config.scheduler.perception_timeout_ms),
            liveness,
            started: now,
            last_timestamp: None,
            last_sequence: None,
            dirty: true,
        }
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        self.session.snapshot()
    }

    pub fn liveness(&self) -> &LivenessToken {
        &self.liveness
    }

    /// Run one tick
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.liveness.is_alive() {
            return TickOutcome::Stopped;
        }

        self.sync_camera_status();

        let frame = self.frames.current_frame().await;
        if !self.liveness.is_alive() {
            return TickOutcome::Stopped;
        }
        let Some(frame) = frame else {
            return TickOutcome::NotReady;
        };
        if self.last_sequence == Some(frame.sequence) {
            // Display refresh outpaces capture; wait for a new frame
            return TickOutcome::NotReady;
        }

        let timestamp = self.next_timestamp();
        let result = self.detect(&frame, timestamp).await;
        if !self.liveness.is_alive() {
            return TickOutcome::Stopped;
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping tick at {} ms: {}", timestamp.as_millis(), e);
                return TickOutcome::Failed;
            }
        };

        self.session.apply(raw, &self.classifier, &self.controller);
        self.last_sequence = Some(frame.sequence);
        if let Some(fps) = self.fps.record(Instant::now()) {
            debug!("Tracking at {} fps", fps);
            self.session.update_snapshot(|s| s.with_fps(fps));
        }
        self.dirty = true;

        TickOutcome::Updated
    }

    /// Tick at the target rate until cancelled or the app shuts down
    pub async fn run(mut self, state: Arc<AppState>) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.target_fps));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut shutdown_rx = state.subscribe_shutdown();

        info!(
            "Tracking scheduler started ({} fps target, perception: {})",
            self.target_fps,
            self.perception.name()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.liveness.cancelled() => break,
                _ = shutdown_rx.recv() => {
                    self.liveness.cancel();
                    break;
                }
            }

            if self.tick().await == TickOutcome::Stopped {
                break;
            }

            if std::mem::take(&mut self.dirty) {
                state.publish(self.session.snapshot().clone()).await;
            }
        }

        info!(
            "Tracking scheduler stopped after {} ticks",
            self.session.snapshot().tick()
        );
    }

    async fn detect(
        &self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<RawObservations, PerceptionError> {
        let limit = self.call_timeout;
        let timeout_ms = limit.as_millis() as u64;
        let lease = &self.perception;

        let detection = tokio::time::timeout(limit, lease.detect_faces(frame, timestamp))
            .await
            .map_err(|_| PerceptionError::Timeout(timeout_ms))??;
        let landmarks = tokio::time::timeout(limit, lease.detect_face_landmarks(frame, timestamp))
            .await
            .map_err(|_| PerceptionError::Timeout(timeout_ms))??;
        let hand = tokio::time::timeout(limit, lease.detect_hands(frame, timestamp))
            .await
            .map_err(|_| PerceptionError::Timeout(timeout_ms))??;

        Ok(RawObservations {
            detection,
            landmarks,
            hand,
        })
    }

    /// Milliseconds since the session started, strictly increasing
    fn next_timestamp(&mut self) -> Timestamp {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let timestamp = match self.last_timestamp {
            Some(previous) if elapsed <= previous.0 => Timestamp(previous.0 + 1),
            _ => Timestamp(elapsed),
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    /// Mirror camera failures into the session status
    fn sync_camera_status(&mut self) {
        let camera = self.camera_status.borrow_and_update().clone();
        let status = self.session.snapshot().status();

        match camera {
            CameraStatus::Error { message, .. } => {
                if self.session.snapshot().error_message() != Some(message.as_str()) {
                    error!("Tracking session error: {}", message);
                    self.session.update_snapshot(|s| s.with_error(message));
                    self.dirty = true;
                }
            }
            CameraStatus::Acquiring { .. } | CameraStatus::Ready { .. }
                if status == SessionStatus::Error =>
            {
                info!("New camera source selected, reloading session");
                self.session.update_snapshot(SessionSnapshot::with_reload);
                self.dirty = true;
            }
            _ => {}
        }
    }
}
