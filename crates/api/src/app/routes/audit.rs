use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::IntoResponse,
    routing::get,
};

use ledgergate_infra::{AuditQuery, AuditSink};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(query_audit))
}

/// Audit records filtered by `actor`, `action` and `entity_ref`.
pub async fn query_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = services.run(move |e| Ok(e.audit.query(&q))).await?;
    Ok(Json(records))
}
