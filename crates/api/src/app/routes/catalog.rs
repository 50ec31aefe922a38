use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use ledgergate_inventory::StockThresholds;
use ledgergate_infra::{RegisterLocation, RegisterPart};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/parts", get(list_parts).post(register_part))
        .route("/parts/:part", get(get_part))
        .route("/parts/:part/deactivate", post(deactivate_part))
        .route("/parts/:part/thresholds", post(set_thresholds))
        .route("/locations", get(list_locations).post(register_location))
        .route("/locations/:code", get(get_location))
        .route("/locations/:code/deactivate", post(deactivate_location))
}

pub async fn register_part(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<RegisterPart>,
) -> Result<impl IntoResponse, ApiError> {
    let part = services
        .run(move |e| e.catalog.register_part(body, actor.actor()))
        .await?;
    Ok((StatusCode::CREATED, Json(part)))
}

pub async fn list_parts(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.run(|e| Ok(e.catalog.parts())).await?))
}

pub async fn get_part(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let part = dto::parse_part(&part)?;
    Ok(Json(services.run(move |e| e.catalog.part(&part)).await?))
}

pub async fn deactivate_part(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(part): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let part = dto::parse_part(&part)?;
    Ok(Json(
        services
            .run(move |e| e.catalog.deactivate_part(&part, actor.actor()))
            .await?,
    ))
}

pub async fn set_thresholds(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(part): Path<String>,
    Json(body): Json<StockThresholds>,
) -> Result<impl IntoResponse, ApiError> {
    let part = dto::parse_part(&part)?;
    Ok(Json(
        services
            .run(move |e| e.catalog.set_thresholds(&part, body, actor.actor()))
            .await?,
    ))
}

pub async fn register_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<RegisterLocation>,
) -> Result<impl IntoResponse, ApiError> {
    let location = services
        .run(move |e| e.catalog.register_location(body, actor.actor()))
        .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn list_locations(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.run(|e| Ok(e.catalog.locations())).await?))
}

pub async fn get_location(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = dto::parse_location(&code)?;
    Ok(Json(services.run(move |e| e.catalog.location(&code)).await?))
}

pub async fn deactivate_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = dto::parse_location(&code)?;
    Ok(Json(
        services
            .run(move |e| e.catalog.deactivate_location(&code, actor.actor()))
            .await?,
    ))
}
