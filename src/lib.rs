//! Posehud - Face mood and hand gesture tracking service
//!
//! Turns a live camera or network video stream into two continuously
//! updated signals:
//! - A face observation with a rule-based mood estimate
//! - A gesture control state (scale + spin) driven by one hand
//!
//! Inference runs in an external tracker helper; this crate owns the camera
//! lifecycle, the tick loop and the published session state.

pub mod camera;
pub mod config;
pub mod error;
pub mod gesture;
pub mod mood;
pub mod output;
pub mod perception;
pub mod session;
pub mod tracking;
pub mod web;

pub use config::Config;
pub use error::{PosehudError, Result};

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use camera::CameraManager;
use session::SessionSnapshot;

/// Application state shared across all components
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Latest published session snapshot
    pub snapshot: RwLock<SessionSnapshot>,
    /// Channel for snapshot updates
    pub snapshot_tx: broadcast::Sender<SessionSnapshot>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
    /// Owner of the live video stream
    pub camera: Arc<CameraManager>,
}

impl AppState {
    /// Create a new application state with the given configuration
    pub fn new(config: Config, camera: Arc<CameraManager>) -> Arc<Self> {
        let (snapshot_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        let initial = SessionSnapshot::new(gesture::GestureControlState::initial(&config.gesture));

        Arc::new(Self {
            config: RwLock::new(config),
            snapshot: RwLock::new(initial),
            snapshot_tx,
            shutdown_tx,
            camera,
        })
    }

    /// Replace the published snapshot and broadcast it
    pub async fn publish(&self, snapshot: SessionSnapshot) {
        let mut current = self.snapshot.write().await;
        *current = snapshot.clone();
        let _ = self.snapshot_tx.send(snapshot);
    }

    /// Get the latest snapshot
    pub async fn get_snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
