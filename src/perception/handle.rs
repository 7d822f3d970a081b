//! Shared perception handle
//!
//! One backend instance is created up front and handed to sessions by
//! reference. `init` runs the backend's model loading exactly once, sessions
//! hold counted leases, and `dispose` refuses while any lease is live.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{FaceDetection, FaceLandmarks, HandLandmarks, PerceptionBackend, Timestamp};
use crate::camera::Frame;
use crate::error::PerceptionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Disposed,
}

struct Inner {
    backend: Box<dyn PerceptionBackend>,
    lifecycle: Lifecycle,
}

struct Shared {
    name: &'static str,
    inner: Mutex<Inner>,
    leases: AtomicUsize,
}

/// Cloneable reference to the single perception backend
#[derive(Clone)]
pub struct PerceptionHandle {
    shared: Arc<Shared>,
}

impl PerceptionHandle {
    /// Wrap a backend (does not load models yet)
    pub fn new(backend: Box<dyn PerceptionBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: backend.name(),
                inner: Mutex::new(Inner {
                    backend,
                    lifecycle: Lifecycle::Created,
                }),
                leases: AtomicUsize::new(0),
            }),
        }
    }

    /// Backend identifier
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Load models once; later calls reuse the loaded instance
    pub async fn init(&self) -> Result<(), PerceptionError> {
        let mut inner = self.shared.inner.lock().await;
        match inner.lifecycle {
            Lifecycle::Ready => {
                tracing::debug!("Reusing initialized perception backend '{}'", self.name());
                Ok(())
            }
            Lifecycle::Disposed => Err(PerceptionError::Disposed),
            Lifecycle::Created => {
                tracing::info!("Loading perception backend '{}'", self.name());
                inner.backend.init().await.map_err(|e| {
                    tracing::error!("Perception initialization failed: {}", e);
                    e
                })?;
                inner.lifecycle = Lifecycle::Ready;
                tracing::info!("Perception backend '{}' ready", self.name());
                Ok(())
            }
        }
    }

    /// Take a counted lease for one tracking session
    pub fn lease(&self) -> PerceptionLease {
        self.shared.leases.fetch_add(1, Ordering::SeqCst);
        PerceptionLease {
            handle: self.clone(),
        }
    }

    /// Number of live leases
    pub fn leases(&self) -> usize {
        self.shared.leases.load(Ordering::SeqCst)
    }

    /// Close the backend. Fails while sessions still hold leases.
    pub async fn dispose(&self) -> Result<(), PerceptionError> {
        let leases = self.leases();
        if leases > 0 {
            return Err(PerceptionError::InUse(leases));
        }

        let mut inner = self.shared.inner.lock().await;
        if inner.lifecycle != Lifecycle::Disposed {
            tracing::info!("Disposing perception backend '{}'", self.name());
            inner.backend.close().await;
            inner.lifecycle = Lifecycle::Disposed;
        }
        Ok(())
    }
}

/// A session's claim on the perception backend
pub struct PerceptionLease {
    handle: PerceptionHandle,
}

impl PerceptionLease {
    pub fn name(&self) -> &'static str {
        self.handle.name()
    }

    pub async fn detect_faces(
        &self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceDetection>, PerceptionError> {
        let mut inner = self.ready_inner().await?;
        inner.backend.detect_faces(frame, timestamp).await
    }

    pub async fn detect_face_landmarks(
        &self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceLandmarks>, PerceptionError> {
        let mut inner = self.ready_inner().await?;
        inner.backend.detect_face_landmarks(frame, timestamp).await
    }

    pub async fn detect_hands(
        &self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<HandLandmarks>, PerceptionError> {
        let mut inner = self.ready_inner().await?;
        inner.backend.detect_hands(frame, timestamp).await
    }

    async fn ready_inner(&self) -> Result<tokio::sync::MutexGuard<'_, Inner>, PerceptionError> {
        let inner = self.handle.shared.inner.lock().await;
        match inner.lifecycle {
            Lifecycle::Ready => Ok(inner),
            Lifecycle::Created => Err(PerceptionError::NotInitialized),
            Lifecycle::Disposed => Err(PerceptionError::Disposed),
        }
    }
}

impl Drop for PerceptionLease {
    fn drop(&mut self) {
        self.handle.shared.leases.fetch_sub(1, Ordering::SeqCst);
    }
}
