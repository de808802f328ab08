use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Service;

pub mod routes;

/// Server state
pub struct AppState {
    pub service: Arc<Service>,
}

pub fn router(service: Arc<Service>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/status", get(routes::status))
        .route("/search", post(routes::search))
        .route("/index", post(routes::index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, service: Arc<Service>) -> anyhow::Result<()> {
    let app = router(service.clone());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    service.shutdown();
    Ok(())
}
