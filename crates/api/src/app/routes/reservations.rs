use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use ledgergate_core::ReservationId;

use crate::app::dto::{self, ReservationsQuery, ReserveBody};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reservations).post(create_reservation))
        .route("/:id", get(get_reservation))
        .route("/:id/fulfill", post(fulfill_reservation))
        .route("/:id/cancel", post(cancel_reservation))
}

pub async fn create_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<ReserveBody>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.into_request()?;
    let reservation = services
        .run(move |e| e.reservations.reserve(req, actor.actor()))
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

pub async fn list_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ReservationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = services.run(move |e| Ok(e.reservations.list(q.status))).await?;
    Ok(Json(items))
}

pub async fn get_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ReservationId = dto::parse_id(&id)?;
    Ok(Json(services.run(move |e| e.reservations.get(id)).await?))
}

/// Writes the exit movement and closes the reservation.
pub async fn fulfill_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ReservationId = dto::parse_id(&id)?;
    let done = services
        .run(move |e| e.reservations.fulfill(id, actor.actor()))
        .await?;
    Ok(Json(done))
}

pub async fn cancel_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ReservationId = dto::parse_id(&id)?;
    let reservation = services
        .run(move |e| e.reservations.cancel(id, actor.actor()))
        .await?;
    Ok(Json(reservation))
}
