//! HTTP application wiring (Axum router over a [`MigrationProxy`]).
//!
//! - `routes/`: handlers, one file per area (`migrate`, `system`)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use jobshift_live::MigrationProxy;
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;

/// Response header naming where a job went: `target` or `legacy`.
pub const ROUTED_HEADER: &str = "x-migration-routed";

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(proxy: Arc<MigrationProxy>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::migrate::router())
        .layer(ServiceBuilder::new().layer(Extension(proxy)))
}
