//! HTTP surface: routing, shared state and server startup.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::constants::MAX_BODY_BYTES;
use crate::generate::{GenerationOptions, ImageGenerator};
use crate::imaging::pipeline::Pipeline;

mod prelude;
mod views;

use views::{
    apply_grain_handler, apply_logo_handler, debug_handler, generate_image_handler,
    not_found_handler,
};

#[derive(Clone)]
pub(crate) struct AppState {
    generator: Arc<dyn ImageGenerator>,
    pipeline: Pipeline,
    generation: Arc<GenerationOptions>,
}

impl AppState {
    fn new(
        generator: Arc<dyn ImageGenerator>,
        pipeline: Pipeline,
        generation: GenerationOptions,
    ) -> Self {
        Self {
            generator,
            pipeline,
            generation: Arc::new(generation),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/generate-image", post(generate_image_handler))
        .route("/apply-grain", post(apply_grain_handler))
        .route("/apply-logo", post(apply_logo_handler))
        .route("/debug", post(debug_handler))
        .fallback(not_found_handler)
}

fn build_app(state: AppState) -> Router {
    create_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Binds the listener and serves until ctrl-c.
///
/// `pipeline` must hold a fully loaded grain texture; nothing is loaded lazily.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    generator: Arc<dyn ImageGenerator>,
    pipeline: Pipeline,
    generation: GenerationOptions,
) -> Result<(), anyhow::Error> {
    let app = build_app(AppState::new(generator, pipeline, generation));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}
