use axum::Router;

pub mod audit;
pub mod catalog;
pub mod hil_tasks;
pub mod imports;
pub mod movements;
pub mod reservations;
pub mod stock;
pub mod system;

/// Router for every endpoint that acts on behalf of an actor.
pub fn router() -> Router {
    Router::new()
        .nest("/movements", movements::router())
        .nest("/reservations", reservations::router())
        .nest("/hil-tasks", hil_tasks::router())
        .nest("/import-sessions", imports::router())
        .nest("/catalog", catalog::router())
        .nest("/audit", audit::router())
        .nest("/system", system::router())
        .merge(stock::router())
}
