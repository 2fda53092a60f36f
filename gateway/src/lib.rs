//! HTTP and websocket surface over the broadcast hub.

use std::io;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use market::{shutdown_requested, BroadcastHub, Feed};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

mod routes;
mod ws;

pub use routes::{HealthReport, INDEX_HTML};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub feed: Arc<Feed>,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>, feed: Arc<Feed>) -> Self {
        Self { hub, feed }
    }
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/latest_data", get(routes::latest_data))
        .route("/health", get(routes::health))
        .route("/ws", get(ws::ws_handler))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// `*` anywhere in the list allows every origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|x| x.trim() == "*") {
        return CorsLayer::permissive();
    }

    let allowed = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

/// Serves until `shutdown` flips to `true` (or its sender is dropped).
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
        .await?;
    info!(%addr, "gateway stopped");
    Ok(())
}
