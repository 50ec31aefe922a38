use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use ledgergate_infra::workers::ExpirySweeper;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/replay", post(replay))
        .route("/sweep", post(sweep))
        .route("/reorder-alerts", get(reorder_alerts))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(actor): Extension<ActorContext>) -> impl IntoResponse {
    Json(serde_json::json!({ "actor": actor.actor() }))
}

/// Rebuild quantities from the log and report any divergence from live balances.
pub async fn replay(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.run(|e| e.projector.replay()).await?))
}

/// Run one expiry pass now instead of waiting for the background sweeper.
pub async fn sweep(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    let report = services
        .run(|e| {
            let sweeper = ExpirySweeper::new(e.reservations.clone(), e.router.clone(), e.imports.clone());
            Ok(sweeper.sweep(Utc::now()))
        })
        .await?;
    Ok(Json(report))
}

pub async fn reorder_alerts(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.run(|e| Ok(e.alerts.all())).await?))
}
