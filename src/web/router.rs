//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::{handlers, AppState};
use axum::{routing::get, Router};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Create the axum application for the enabled peripherals.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new().route("/health", get(handlers::health_check));

    if state.sensor.is_some() {
        app = app.route("/read", get(handlers::read_sensor));
    }
    if state.camera.is_some() {
        app = app
            .route("/snapshot.jpg", get(handlers::snapshot))
            .route("/mjpeg", get(handlers::mjpeg));
    }

    match config.static_path.as_ref().map(PathBuf::from) {
        Some(static_path) if static_path.exists() => {
            info!("Serving static files from: {:?}", static_path);
            app = app.nest_service("/static", ServeDir::new(&static_path));

            let index_file = static_path.join("index.html");
            if index_file.exists() {
                app = app.route_service("/", ServeFile::new(index_file));
            } else {
                app = app.route("/", get(handlers::default_index));
            }
        }
        Some(static_path) => {
            warn!(
                "Static path {:?} does not exist, serving default index",
                static_path
            );
            app = app.route("/", get(handlers::default_index));
        }
        None => {
            app = app.route("/", get(handlers::default_index));
        }
    }

    let mut app = app.with_state(state);

    // Add CORS if enabled
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_disabled_peripherals_have_no_routes() {
        let app = create_app(&WebConfig::default(), AppState::default());

        let response = app
            .oneshot(Request::get("/mjpeg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_default_index() {
        let app = create_app(&WebConfig::default(), AppState::default());

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
