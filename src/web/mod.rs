//! HTTP API: JSON endpoints plus the snapshot event stream.

pub mod api;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::HttpConfig;
use crate::error::WebError;
use crate::AppState;

/// HTTP front end bound to one `AppState`
pub struct WebServer {
    app_state: Arc<AppState>,
    config: HttpConfig,
}

impl WebServer {
    pub fn new(app_state: Arc<AppState>, config: &HttpConfig) -> Self {
        Self {
            app_state,
            config: config.clone(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn router(&self) -> Router {
        routes::create_router(Arc::clone(&self.app_state), &self.config)
    }

    /// Serve until the app-wide shutdown signal fires
    pub async fn serve(self) -> Result<(), WebError> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| WebError::Bind(format!("{}: {}", addr, e)))?;
        info!("HTTP API listening on {}", addr);

        let mut shutdown_rx = self.app_state.subscribe_shutdown();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .map_err(|e| WebError::Startup(e.to_string()))?;

        info!("HTTP API stopped");
        Ok(())
    }
}
