use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde_json::json;

use ledgergate_core::MovementId;
use ledgergate_inventory::PartCode;
use ledgergate_infra::SubmitOutcome;

use crate::app::dto::{self, MovementsQuery, SubmitMovementRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movements).post(submit_movement))
        .route("/:id", get(get_movement))
}

/// Propose a movement; it is either appended now or parked behind an approval task.
pub async fn submit_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<SubmitMovementRequest>,
) -> Result<axum::response::Response, ApiError> {
    let confidence = body.confidence()?;
    let mut draft = body.movement;
    draft.part_number = dto::parse_part(draft.part_number.as_str())?;
    draft.from_location = draft.from_location.map(|l| dto::parse_location(l.as_str())).transpose()?;
    draft.to_location = draft.to_location.map(|l| dto::parse_location(l.as_str())).transpose()?;
    let movement = draft.into_movement(actor.actor(), Utc::now());
    let assignee = body.assignee;

    let outcome = services
        .run(move |e| e.router.submit(movement, confidence, assignee))
        .await?;

    let response = match outcome {
        SubmitOutcome::Autonomous { receipt } => (
            StatusCode::CREATED,
            Json(json!({
                "status": "autonomous",
                "movement_id": receipt.movement_id,
                "sequence_number": receipt.sequence_number,
                "duplicate": receipt.duplicate,
                "balances": receipt.balances,
            })),
        ),
        SubmitOutcome::PendingHil { task_id, reason } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "pending_hil",
                "task_id": task_id,
                "reason": reason.to_string(),
                "rule": reason,
            })),
        ),
    };
    Ok(response.into_response())
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<MovementsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let part: Option<PartCode> = q.part_number.as_deref().map(dto::parse_part).transpose()?;
    let entries = services
        .run(move |e| match &part {
            Some(p) => e.ledger.entries_for_part(p),
            None => e.ledger.entries(),
        })
        .await?;

    let items: Vec<_> = entries
        .iter()
        .map(|entry| {
            json!({
                "sequence_number": entry.sequence_number(),
                "recorded_at": entry.recorded_at(),
                "movement": entry.payload(),
            })
        })
        .collect();
    Ok(Json(json!({ "count": items.len(), "items": items })))
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: MovementId = dto::parse_id(&id)?;
    let entry = services.run(move |e| e.ledger.entry(id)).await?;
    Ok(Json(json!({
        "sequence_number": entry.sequence_number(),
        "recorded_at": entry.recorded_at(),
        "movement": entry.payload(),
    })))
}
