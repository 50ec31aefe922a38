use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use ledgergate_core::SessionId;
use ledgergate_infra::{AnswerSet, StartImport};

use crate::app::dto::{self, ExecuteBody};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_session))
        .route("/:id", get(get_session))
        .route("/:id/answers", post(answer_session))
        .route("/:id/execute", post(execute_session))
        .route("/:id/abort", post(abort_session))
}

pub async fn start_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<StartImport>,
) -> Result<impl IntoResponse, ApiError> {
    let session = services.run(move |e| e.imports.start(body, actor.actor())).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: SessionId = dto::parse_id(&id)?;
    Ok(Json(services.run(move |e| e.imports.get(id)).await?))
}

pub async fn answer_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<AnswerSet>,
) -> Result<impl IntoResponse, ApiError> {
    let id: SessionId = dto::parse_id(&id)?;
    let session = services
        .run(move |e| e.imports.answer(id, body, actor.actor()))
        .await?;
    Ok(Json(session))
}

/// Submit the session's rows through the router. The body is optional.
pub async fn execute_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<ExecuteBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let id: SessionId = dto::parse_id(&id)?;
    let assignee = body.and_then(|Json(b)| b.assignee);
    let execution = services
        .run(move |e| e.imports.execute(id, actor.actor(), assignee))
        .await?;
    Ok(Json(execution))
}

pub async fn abort_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: SessionId = dto::parse_id(&id)?;
    Ok(Json(services.run(move |e| e.imports.abort(id, actor.actor())).await?))
}
