//! Camera source lifecycle
//!
//! `select_source` is the only mutator. Every switch runs teardown of the
//! current stream to completion before a settle delay and the new
//! acquisition; a newer selection supersedes an older one at any await point.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use super::{CameraBackend, CameraSourceSpec, DeviceInfo, Frame, FrameSource, StreamHandle, VideoRequest};
use crate::config::CameraConfig;
use crate::error::CameraError;

/// Observable camera state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CameraStatus {
    /// No source selected, or shut down
    Idle,
    /// Tearing down / settling / waiting for the first frame
    Acquiring { source: CameraSourceSpec },
    /// First decodable frame is available
    Ready { source: CameraSourceSpec },
    /// Acquisition or playback failed; needs a new selection
    Error { kind: String, message: String },
}

impl CameraStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CameraStatus::Ready { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CameraStatus::Error { .. })
    }
}

/// How a `select_source` call ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The new stream is live
    Ready,
    /// A newer selection took over; nothing from this call stays live
    Superseded,
}

struct ActiveStream {
    source: CameraSourceSpec,
    handle: Box<dyn StreamHandle>,
}

/// Owner of the single live stream
pub struct CameraManager {
    backend: Arc<dyn CameraBackend>,
    config: CameraConfig,
    active: Mutex<Option<ActiveStream>>,
    switch_lock: Mutex<()>,
    generation: watch::Sender<u64>,
    status_tx: watch::Sender<CameraStatus>,
}

impl CameraManager {
    /// Create an idle manager (no stream is opened yet)
    pub fn new(backend: Arc<dyn CameraBackend>, config: &CameraConfig) -> Self {
        let (generation, _) = watch::channel(0);
        let (status_tx, _) = watch::channel(CameraStatus::Idle);

        Self {
            backend,
            config: config.clone(),
            active: Mutex::new(None),
            switch_lock: Mutex::new(()),
            generation,
            status_tx,
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> CameraStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<CameraStatus> {
        self.status_tx.subscribe()
    }

    /// Replace the active source.
    ///
    /// Tears the current stream down, waits the settle delay, acquires the new
    /// source and resolves once its first frame is decodable. Failures move
    /// the status to `Error` and are not retried.
    pub async fn select_source(&self, source: CameraSourceSpec) -> Result<SelectOutcome, CameraError> {
        let generation = self.next_generation();
        let mut superseded = self.generation.subscribe();

        let _switch = self.switch_lock.lock().await;
        if *superseded.borrow_and_update() != generation {
            debug!("Selection of {} superseded before teardown", source.display_name());
            return Ok(SelectOutcome::Superseded);
        }

        self.status_tx.send_replace(CameraStatus::Acquiring {
            source: source.clone(),
        });
        let mut acquiring = AcquiringGuard::new(&self.status_tx);

        self.teardown().await;

        let request = match VideoRequest::for_source(&source, &self.config) {
            Ok(r) => r,
            Err(e) => {
                acquiring.disarm();
                return Err(self.fail(e));
            }
        };
        info!("Acquiring camera source: {} ({})", source.display_name(), request);

        // Settle delay, cancelled by a newer selection
        let settle = Duration::from_millis(self.config.settle_ms);
        let settled = tokio::select! {
            _ = tokio::time::sleep(settle) => true,
            _ = wait_superseded(&mut superseded, generation) => false,
        };
        if !settled {
            debug!("Selection of {} superseded during settle", source.display_name());
            return Ok(SelectOutcome::Superseded);
        }

        let opened = tokio::select! {
            result = self.backend.open(&request) => Some(result),
            _ = wait_superseded(&mut superseded, generation) => None,
        };
        let mut handle = match opened {
            Some(Ok(handle)) => handle,
            Some(Err(e)) => {
                acquiring.disarm();
                return Err(self.fail(e));
            }
            None => {
                debug!("Selection of {} superseded during open", source.display_name());
                return Ok(SelectOutcome::Superseded);
            }
        };

        let ready_timeout = Duration::from_millis(self.config.ready_timeout_ms);
        let ready = tokio::select! {
            result = tokio::time::timeout(ready_timeout, handle.wait_ready()) => Some(result),
            _ = wait_superseded(&mut superseded, generation) => None,
        };

        match ready {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => {
                handle.stop().await;
                acquiring.disarm();
                return Err(self.fail(e));
            }
            Some(Err(_)) => {
                handle.stop().await;
                acquiring.disarm();
                return Err(self.fail(CameraError::NetworkOrStream(format!(
                    "no decodable frame within {} ms",
                    self.config.ready_timeout_ms
                ))));
            }
            None => {
                handle.stop().await;
                debug!("Selection of {} superseded while waiting for first frame", source.display_name());
                return Ok(SelectOutcome::Superseded);
            }
        }

        info!("Camera connected: {} ({})", source.display_name(), handle.describe());
        *self.active.lock().await = Some(ActiveStream {
            source: source.clone(),
            handle,
        });
        self.status_tx.send_replace(CameraStatus::Ready { source });
        acquiring.disarm();

        Ok(SelectOutcome::Ready)
    }

    /// Stop the live stream and return to idle
    pub async fn shutdown(&self) {
        self.next_generation();
        let _switch = self.switch_lock.lock().await;
        self.teardown().await;
        self.status_tx.send_replace(CameraStatus::Idle);
        info!("Camera manager shut down");
    }

    /// Video inputs available for webcam selection
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let devices = self.backend.list_devices().await?;
        debug!("{} video input(s) found via {}", devices.len(), self.backend.name());
        Ok(devices)
    }

    /// Source of the live stream, if any
    pub async fn active_source(&self) -> Option<CameraSourceSpec> {
        self.active.lock().await.as_ref().map(|a| a.source.clone())
    }

    fn next_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            next = *g;
        });
        next
    }

    async fn teardown(&self) {
        let previous = self.active.lock().await.take();
        if let Some(mut stream) = previous {
            info!("Stopping stream: {}", stream.handle.describe());
            stream.handle.stop().await;
        }
    }

    fn fail(&self, e: CameraError) -> CameraError {
        error!("Camera error: {}", e);
        self.status_tx.send_replace(CameraStatus::Error {
            kind: e.kind().to_string(),
            message: e.to_string(),
        });
        e
    }
}

#[async_trait]
impl FrameSource for CameraManager {
    async fn current_frame(&self) -> Option<Frame> {
        let mut active = self.active.lock().await;

        let failure = match active.as_mut() {
            None => return None,
            Some(stream) => match stream.handle.poll_error() {
                None => return stream.handle.current_frame(),
                Some(e) => e,
            },
        };

        let failed = active.take();
        drop(active);

        if let Some(mut stream) = failed {
            stream.handle.stop().await;
        }
        let failure = match failure {
            e @ CameraError::NetworkOrStream(_) => e,
            other => CameraError::NetworkOrStream(other.to_string()),
        };
        self.fail(failure);
        None
    }
}

/// Puts an abandoned acquisition back to `Idle`.
///
/// Armed once the status reads `Acquiring`; a selection that is superseded
/// or whose future is dropped leaves through `Drop` while still armed.
struct AcquiringGuard<'a> {
    status_tx: &'a watch::Sender<CameraStatus>,
    armed: bool,
}

impl<'a> AcquiringGuard<'a> {
    fn new(status_tx: &'a watch::Sender<CameraStatus>) -> Self {
        Self {
            status_tx,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AcquiringGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.status_tx.send_if_modified(|status| {
            if matches!(status, CameraStatus::Acquiring { .. }) {
                *status = CameraStatus::Idle;
                true
            } else {
                false
            }
        });
    }
}

/// Resolve once the generation moves past `generation`
async fn wait_superseded(rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    /// Records every backend interaction and tracks how many handles are live
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub events: Arc<StdMutex<Vec<String>>>,
        pub live: Arc<AtomicUsize>,
        pub max_live: Arc<AtomicUsize>,
        pub open_error: StdMutex<Option<CameraError>>,
        pub ready_error: StdMutex<Option<CameraError>>,
        pub playback_error: Arc<StdMutex<Option<CameraError>>>,
        /// Streams opened while set never deliver a first frame
        pub hang_ready: AtomicBool,
    }

    impl RecordingBackend {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    pub(crate) struct MockStream {
        pub label: String,
        pub events: Arc<StdMutex<Vec<String>>>,
        pub live: Arc<AtomicUsize>,
        pub stopped: bool,
        pub ready_error: Option<CameraError>,
        pub playback_error: Arc<StdMutex<Option<CameraError>>>,
        pub frame: Option<Frame>,
        pub hang_ready: bool,
    }

    impl MockStream {
        fn release(&mut self, event: &str) {
            if !self.stopped {
                self.stopped = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
                self.events.lock().unwrap().push(format!("{}:{}", event, self.label));
            }
        }
    }

    #[async_trait]
    impl StreamHandle for MockStream {
        fn describe(&self) -> String {
            self.label.clone()
        }

        async fn wait_ready(&mut self) -> Result<(), CameraError> {
            if self.hang_ready {
                std::future::pending::<()>().await;
            }
            match self.ready_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn current_frame(&self) -> Option<Frame> {
            self.frame
        }

        fn poll_error(&mut self) -> Option<CameraError> {
            self.playback_error.lock().unwrap().take()
        }

        async fn stop(&mut self) {
            self.release("stop");
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.release("drop");
        }
    }

    #[async_trait]
    impl CameraBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
            Ok(vec![
                DeviceInfo {
                    device_id: "cam-1".to_string(),
                    label: "Front Camera".to_string(),
                },
                DeviceInfo {
                    device_id: "cam-2".to_string(),
                    label: "USB Camera".to_string(),
                },
            ])
        }

        async fn open(&self, request: &VideoRequest) -> Result<Box<dyn StreamHandle>, CameraError> {
            self.events.lock().unwrap().push(format!("open:{}", request));
            if let Some(e) = self.open_error.lock().unwrap().take() {
                return Err(e);
            }

            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);

            Ok(Box::new(MockStream {
                label: request.to_string(),
                events: Arc::clone(&self.events),
                live: Arc::clone(&self.live),
                stopped: false,
                ready_error: self.ready_error.lock().unwrap().take(),
                playback_error: Arc::clone(&self.playback_error),
                frame: Some(Frame {
                    sequence: 1,
                    width: 640,
                    height: 480,
                    captured_at: Instant::now(),
                }),
                hang_ready: self.hang_ready.load(Ordering::SeqCst),
            }))
        }
    }

    fn manager(backend: &Arc<RecordingBackend>) -> CameraManager {
        let backend: Arc<dyn CameraBackend> = backend.clone();
        CameraManager::new(backend, &CameraConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_tears_down_before_acquire() {
        let backend = Arc::new(RecordingBackend::default());
        let cameras = manager(&backend);

        let remote = CameraSourceSpec::ip_stream("http://192.168.1.100:8080/video");
        assert_eq!(cameras.select_source(remote).await.unwrap(), SelectOutcome::Ready);
        assert!(cameras.status().is_ready());

        let device = CameraSourceSpec::webcam(Some("cam-1"), None);
        assert_eq!(cameras.select_source(device).await.unwrap(), SelectOutcome::Ready);

        let events = backend.events();
        assert_eq!(
            events,
            vec![
                "open:remote:http://192.168.1.100:8080/video".to_string(),
                "stop:remote:http://192.168.1.100:8080/video".to_string(),
                "open:device:cam-1".to_string(),
            ]
        );
        assert_eq!(backend.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);
        assert_eq!(
            cameras.active_source().await.and_then(|s| s.device_id().map(str::to_string)),
            Some("cam-1".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_selection_supersedes_settle() {
        let backend = Arc::new(RecordingBackend::default());
        let cameras = manager(&backend);

        let first = cameras.select_source(CameraSourceSpec::ip_stream("http://cam/a"));
        let second = cameras.select_source(CameraSourceSpec::webcam(Some("cam-1"), None));
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), SelectOutcome::Superseded);
        assert_eq!(second.unwrap(), SelectOutcome::Ready);
        assert_eq!(backend.events(), vec!["open:device:cam-1".to_string()]);
        assert_eq!(backend.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_error_is_terminal() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.open_error.lock().unwrap() = Some(CameraError::PermissionDenied);
        let cameras = manager(&backend);

        let result = cameras.select_source(CameraSourceSpec::webcam(None, None)).await;
        assert_eq!(result, Err(CameraError::PermissionDenied));

        match cameras.status() {
            CameraStatus::Error { kind, .. } => assert_eq!(kind, "permission_denied"),
            other => panic!("unexpected status: {:?}", other),
        }
        // No retry
        assert_eq!(backend.events().len(), 1);
        assert!(cameras.current_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_failure_releases_handle() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.ready_error.lock().unwrap() =
            Some(CameraError::NetworkOrStream("404".to_string()));
        let cameras = manager(&backend);

        let result = cameras
            .select_source(CameraSourceSpec::ip_stream("http://cam/missing"))
            .await;
        assert!(matches!(result, Err(CameraError::NetworkOrStream(_))));
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert!(cameras.status().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_source_still_tears_down() {
        let backend = Arc::new(RecordingBackend::default());
        let cameras = manager(&backend);

        cameras
            .select_source(CameraSourceSpec::webcam(None, None))
            .await
            .unwrap();
        let result = cameras.select_source(CameraSourceSpec::ip_stream("")).await;

        assert!(matches!(result, Err(CameraError::InvalidSource(_))));
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert!(cameras.status().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_stream() {
        let backend = Arc::new(RecordingBackend::default());
        let cameras = manager(&backend);

        cameras
            .select_source(CameraSourceSpec::webcam(Some("cam-2"), None))
            .await
            .unwrap();
        assert!(cameras.current_frame().await.is_some());

        cameras.shutdown().await;
        assert_eq!(cameras.status(), CameraStatus::Idle);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert!(cameras.current_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_tears_down() {
        let backend = Arc::new(RecordingBackend::default());
        let cameras = manager(&backend);

        cameras
            .select_source(CameraSourceSpec::ip_stream("rtsp://cam.local/live"))
            .await
            .unwrap();
        *backend.playback_error.lock().unwrap() = Some(CameraError::DeviceBusy);

        assert!(cameras.current_frame().await.is_none());
        match cameras.status() {
            CameraStatus::Error { kind, .. } => assert_eq!(kind, "network_or_stream"),
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert!(cameras.active_source().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_selection_releases_pending_stream() {
        let backend = Arc::new(RecordingBackend::default());
        backend.hang_ready.store(true, Ordering::SeqCst);
        let cameras = Arc::new(manager(&backend));

        let pending = {
            let cameras = Arc::clone(&cameras);
            tokio::spawn(async move {
                cameras
                    .select_source(CameraSourceSpec::webcam(Some("cam-1"), None))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(matches!(cameras.status(), CameraStatus::Acquiring { .. }));
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(cameras.status(), CameraStatus::Idle);
        assert!(backend.events().contains(&"drop:device:cam-1".to_string()));
        assert!(cameras.current_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_while_waiting_for_first_frame() {
        let backend = Arc::new(RecordingBackend::default());
        backend.hang_ready.store(true, Ordering::SeqCst);
        let cameras = Arc::new(manager(&backend));

        let first = {
            let cameras = Arc::clone(&cameras);
            tokio::spawn(async move {
                cameras
                    .select_source(CameraSourceSpec::webcam(Some("cam-1"), None))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);

        backend.hang_ready.store(false, Ordering::SeqCst);
        let second = cameras
            .select_source(CameraSourceSpec::webcam(Some("cam-2"), None))
            .await;

        assert_eq!(second.unwrap(), SelectOutcome::Ready);
        assert_eq!(first.await.unwrap().unwrap(), SelectOutcome::Superseded);
        assert_eq!(
            backend.events(),
            vec![
                "open:device:cam-1".to_string(),
                "stop:device:cam-1".to_string(),
                "open:device:cam-2".to_string(),
            ]
        );
        assert_eq!(backend.max_live.load(Ordering::SeqCst), 1);
        assert!(cameras.status().is_ready());
    }
}
