//! Posehud - Face mood and hand gesture tracking service
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use posehud::{
    camera::{CameraBackend, CameraManager, CameraSourceSpec, FrameSource, SelectOutcome},
    config::Config,
    perception::PerceptionHandle,
    tracking::{
        mediapipe::{MpCameraBackend, MpPerception, TrackerFeed},
        subprocess::check_tracker_available,
        LivenessToken, TrackingScheduler,
    },
    web::WebServer,
    AppState,
};

/// Posehud - Face mood and hand gesture tracking service
#[derive(Parser, Debug)]
#[command(name = "posehud", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device to open (overrides config)
    #[arg(short, long, conflicts_with = "url")]
    device: Option<String>,

    /// IP camera stream URL: http(s) MJPEG or rtsp (overrides config)
    #[arg(short, long)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable HTTP server
    #[arg(long)]
    no_http: bool,

    /// HTTP server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Running services
struct Services {
    state: Arc<AppState>,
    perception: PerceptionHandle,
    liveness: LivenessToken,
    scheduler: JoinHandle<()>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", posehud::NAME, posehud::VERSION);

    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let services = setup_and_spawn_services(&args).await?;

        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown_services(services).await;

        Ok::<(), anyhow::Error>(())
    })?;

    info!("Posehud stopped");
    Ok(())
}

/// Setup config, create AppState, and spawn all background services.
async fn setup_and_spawn_services(args: &Args) -> anyhow::Result<Services> {
    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if let Some(ref device) = args.device {
        config.camera.default_source = Some(CameraSourceSpec::webcam(Some(device.as_str()), None));
    }
    if let Some(ref url) = args.url {
        config.camera.default_source = Some(CameraSourceSpec::ip_stream(url));
    }
    if args.no_http {
        config.http.enabled = false;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    // Validate configuration
    config.validate()?;

    info!(
        "Default source: {}",
        config
            .camera
            .default_source
            .as_ref()
            .map(|s| s.display_name())
            .unwrap_or_else(|| "none".to_string())
    );
    info!("Tracker helper: {} (auto-launch: {})", config.tracker.tracker_script, config.tracker.auto_launch);
    info!("HTTP server: {}", config.http.enabled);

    if config.tracker.auto_launch && !check_tracker_available(&config.tracker.python) {
        warn!(
            "'{}' cannot import mediapipe/cv2; the tracker helper will fail to start",
            config.tracker.python
        );
    }

    // Camera and perception share the helper's packet feed
    let feed = TrackerFeed::new();
    let backend: Arc<dyn CameraBackend> = Arc::new(MpCameraBackend::new(&config.tracker, feed.clone()));
    let camera = Arc::new(CameraManager::new(backend, &config.camera));

    let perception = PerceptionHandle::new(Box::new(MpPerception::new(feed)));
    perception.init().await?;

    // Create shared application state
    let state = AppState::new(config.clone(), Arc::clone(&camera));

    // Start HTTP server if enabled
    if config.http.enabled {
        let http_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = run_http_server(http_state).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    // Start the tracking session
    let liveness = LivenessToken::new();
    let frames: Arc<dyn FrameSource> = camera.clone();
    let scheduler = TrackingScheduler::new(
        frames,
        camera.subscribe_status(),
        perception.lease(),
        &config,
        liveness.clone(),
    );
    let scheduler = tokio::spawn(scheduler.run(Arc::clone(&state)));

    // Open the default source
    if let Some(source) = config.camera.default_source.clone() {
        tokio::spawn(async move {
            match camera.select_source(source).await {
                Ok(SelectOutcome::Ready) => {}
                Ok(SelectOutcome::Superseded) => info!("Default source superseded by a newer selection"),
                Err(e) => error!("Failed to open default source: {}", e),
            }
        });
    } else {
        info!("No default source configured, waiting for POST /api/source");
    }

    Ok(Services {
        state,
        perception,
        liveness,
        scheduler,
    })
}

async fn shutdown_services(services: Services) {
    let Services {
        state,
        perception,
        liveness,
        scheduler,
    } = services;

    state.shutdown();
    liveness.cancel();

    // The scheduler returns its perception lease when it exits
    if tokio::time::timeout(Duration::from_secs(3), scheduler).await.is_err() {
        warn!("Tracking scheduler did not stop in time");
    }

    state.camera.shutdown().await;

    if let Err(e) = perception.dispose().await {
        warn!("Perception not disposed: {}", e);
    }
}

async fn run_http_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let http_config = state.config.read().await.http.clone();
    WebServer::new(state, &http_config).serve().await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
