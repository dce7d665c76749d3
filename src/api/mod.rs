//! HTTP API for clients asking whether they need to update
//!
//! - `GET /api/v1/version/check?platform=&version=&build=`
//! - `GET /api/v1/versions?platform=`

pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::version::catalog::CatalogStore;
use crate::version::gate::VersionGate;

/// Shared state threaded through all axum handlers.
pub struct AppState<S: CatalogStore> {
    pub store: Arc<S>,
    pub gate: VersionGate,
}

impl<S: CatalogStore> AppState<S> {
    pub fn new(store: Arc<S>, gate: VersionGate) -> Self {
        Self { store, gate }
    }
}

impl<S: CatalogStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gate: self.gate,
        }
    }
}

/// Build the axum [`Router`] for the version API.
pub fn router<S: CatalogStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/api/v1/version/check", get(handlers::check_version::<S>))
        .route("/api/v1/versions", get(handlers::list_versions::<S>))
        .with_state(state)
}

/// Bind `address` and serve the API until the process is stopped.
pub async fn serve<S: CatalogStore>(address: &str, state: AppState<S>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
