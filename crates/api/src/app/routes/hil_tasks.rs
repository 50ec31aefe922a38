use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use ledgergate_core::TaskId;

use crate::app::dto::{self, ResolveBody, TasksQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tasks))
        .route("/:id", get(get_task))
        .route("/:id/outcome", get(task_outcome))
        .route("/:id/resolve", post(resolve_task))
}

pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<TasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = services
        .run(move |e| Ok(e.router.list_tasks(q.status, q.assignee.as_deref())))
        .await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = dto::parse_id(&id)?;
    Ok(Json(services.run(move |e| e.router.task(id)).await?))
}

/// Pending or approved; a rejected or expired task answers with its terminal error.
pub async fn task_outcome(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = dto::parse_id(&id)?;
    let status = services.run(move |e| e.router.task_outcome(id)).await?;
    Ok(Json(json!({ "task_id": id, "status": status })))
}

pub async fn resolve_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = dto::parse_id(&id)?;
    let resolution = services
        .run(move |e| e.router.resolve(id, body.decision, actor.actor(), body.comment))
        .await?;
    Ok(Json(resolution))
}
