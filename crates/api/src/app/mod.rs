//! HTTP application wiring.
//!
//! - `services.rs`: the shared engine and the blocking bridge into it
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request bodies and query strings
//! - `errors.rs`: error category to status mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let acting = routes::router()
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::actor_middleware)));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(acting)
}
