//! HTTP surface for the sensor and camera.
//!
//! Routes are registered only for the peripherals that are enabled:
//! `/health` always, `/read` with a sensor, `/snapshot.jpg` and `/mjpeg`
//! with a camera.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::camera::CameraConfig;
use crate::error::{PeripheralError, Result};
use crate::sensor::Sensor;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Peripherals shared by every request.
#[derive(Clone, Default)]
pub struct AppState {
    pub sensor: Option<Arc<Sensor>>,
    pub camera: Option<Arc<CameraConfig>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.sensor = Some(Arc::new(sensor));
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = Some(Arc::new(camera));
        self
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn start_web_server(config: WebConfig, state: AppState) -> Result<()> {
    let has_sensor = state.sensor.is_some();
    let has_camera = state.camera.is_some();
    let app = create_app(&config, state);

    // Parse the bind address
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| PeripheralError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PeripheralError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Edge portal listening on http://{}", addr);
    if has_sensor {
        info!("Sensor endpoint: http://{}/read", addr);
    }
    if has_camera {
        info!("Snapshot endpoint: http://{}/snapshot.jpg", addr);
        info!("MJPEG endpoint: http://{}/mjpeg", addr);
    }

    // Open MJPEG streams never finish on their own, so shutdown does not wait
    // for connections; dropping them kills their producers.
    tokio::select! {
        result = async { axum::serve(listener, app).await } => {
            result.map_err(|e| PeripheralError::web_server_error(format!("Server error: {}", e)))?;
        }
        _ = shutdown_signal() => info!("Shutting down web server..."),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await
    }
}
