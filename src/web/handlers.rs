//! HTTP handlers for the sensor and camera endpoints.

use crate::camera::{capture_snapshot, multiplexer, start_mjpeg_session};
use crate::sensor::Reading;
use crate::web::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

/// Failure payload shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub error: String,
}

/// Handler error rendered as a JSON body.
#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn internal(error: impl ToString) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                status: "error",
                timestamp: None,
                error: error.to_string(),
            },
        }
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.body.timestamp = Some(iso8601(at));
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code, Json(self.body)).into_response()
    }
}

/// Successful `/read` payload.
#[derive(Debug, Serialize, PartialEq)]
pub struct ReadingBody {
    pub status: &'static str,
    pub timestamp: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub humidity: f64,
    pub busy: bool,
}

impl ReadingBody {
    pub fn new(reading: &Reading, at: DateTime<Utc>) -> Self {
        Self {
            status: "ok",
            timestamp: iso8601(at),
            temp_c: round2(reading.temperature_c),
            temp_f: round2(reading.temperature_f()),
            humidity: round2(reading.humidity_percent),
            busy: reading.busy,
        }
    }
}

fn iso8601(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Take one sensor measurement.
pub async fn read_sensor(State(state): State<AppState>) -> Result<Json<ReadingBody>, ApiError> {
    let sensor = state
        .sensor
        .as_ref()
        .ok_or_else(|| ApiError::internal("sensor disabled").with_timestamp(Utc::now()))?;

    match sensor.read().await {
        Ok(reading) => Ok(Json(ReadingBody::new(&reading, Utc::now()))),
        Err(e) => {
            error!("Sensor read failed: {}", e);
            Err(ApiError::internal(e).with_timestamp(Utc::now()))
        }
    }
}

/// Capture a single JPEG.
pub async fn snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    let camera = state
        .camera
        .as_ref()
        .ok_or_else(|| ApiError::internal("camera disabled"))?;

    let image = capture_snapshot(camera).await.map_err(|e| {
        error!("Snapshot failed: {}", e);
        ApiError::internal(e)
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        image,
    )
        .into_response())
}

/// Stream the camera as `multipart/x-mixed-replace` until the client leaves.
pub async fn mjpeg(State(state): State<AppState>) -> Result<Response, ApiError> {
    let camera = state
        .camera
        .as_ref()
        .ok_or_else(|| ApiError::internal("camera disabled"))?;

    let session = start_mjpeg_session(camera).map_err(|e| {
        error!("Failed to start MJPEG stream: {}", e);
        ApiError::internal(e)
    })?;
    info!("MJPEG client connected");

    Ok((
        [
            (header::CONTENT_TYPE, multiplexer::content_type()),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        Body::from_stream(ReceiverStream::new(session.body)),
    )
        .into_response())
}

/// Serve the built-in dashboard when no static directory is configured.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

/// Minimal dashboard: live stream plus a polled sensor reading.
const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Edge Portal</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #111; color: #eee; margin: 0; padding: 20px; }
        .container { max-width: 960px; margin: 0 auto; }
        img { width: 100%; border-radius: 8px; background: #000; }
        .reading { display: flex; gap: 24px; margin: 16px 0; font-size: 1.4rem; }
        .error { color: #ff6b6b; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Edge Portal</h1>
        <img src="/mjpeg" alt="camera stream">
        <div class="reading">
            <span id="temp">-- &deg;C</span>
            <span id="humidity">-- %</span>
            <span id="ts"></span>
        </div>
    </div>
    <script>
        async function poll() {
            try {
                const r = await fetch('/read', { cache: 'no-store' });
                const data = await r.json();
                if (data.status === 'ok') {
                    document.getElementById('temp').textContent = `${data.temp_c.toFixed(2)} °C`;
                    document.getElementById('humidity').textContent = `${data.humidity.toFixed(2)} %`;
                    document.getElementById('ts').textContent = new Date(data.timestamp).toLocaleString();
                    document.getElementById('ts').className = '';
                } else {
                    document.getElementById('ts').textContent = data.error;
                    document.getElementById('ts').className = 'error';
                }
            } catch (e) {
                console.error('Failed to read sensor:', e);
            }
        }
        poll();
        setInterval(poll, 2000);
    </script>
</body>
</html>"#;
