use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/balances/:part/:location", get(get_balance))
        .route("/parts/low-stock", get(low_stock))
        .route("/parts/:part/available", get(part_available))
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((part, location)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let part = dto::parse_part(&part)?;
    let location = dto::parse_location(&location)?;
    let balance = services.run(move |e| e.projector.query(&part, &location)).await?;
    Ok(Json(serde_json::json!({
        "part_number": balance.part_number,
        "location": balance.location,
        "quantity": balance.quantity,
        "reserved": balance.reserved,
        "available": balance.available(),
    })))
}

pub async fn part_available(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let part = dto::parse_part(&part)?;
    Ok(Json(services.run(move |e| e.projector.query_available(&part)).await?))
}

pub async fn low_stock(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.run(|e| e.projector.low_stock()).await?))
}
