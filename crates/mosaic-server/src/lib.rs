//! Mosaic Server
//!
//! Exposes the placement engine over HTTP and pushes changes over WebSocket.
//! The guard inside [`MosaicService`] is the only arbiter of which tiles are
//! settled; handlers translate its verdicts into status codes.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;

pub use auth::SharedSecret;
pub use config::Config;
pub use error::ApiError;
pub use events::{ClientMessage, ServerMessage};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use mosaic_core::MosaicService;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared state passed to HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MosaicService>,
    pub config: Arc<Config>,
    pub authorizer: Arc<SharedSecret>,
    pub events: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(config: Config, service: MosaicService) -> Self {
        Self {
            service: Arc::new(service),
            authorizer: Arc::new(SharedSecret::new(config.secret.clone())),
            config: Arc::new(config),
            events: events::channel(),
        }
    }
}

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_image_size;

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/ws", get(events::ws_handler))
        .route("/api/config", get(handlers::get_config))
        .route(
            "/api/placements",
            get(handlers::list_placements)
                .post(handlers::create_placement)
                .delete(handlers::clear_placements),
        )
        .route(
            "/api/placements/{id}",
            axum::routing::delete(handlers::delete_placement),
        )
        .route(
            "/api/images",
            get(handlers::list_images).post(handlers::upload_image),
        )
        .route("/api/images/{name}", get(handlers::get_image))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the server until `shutdown_signal` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await
}
