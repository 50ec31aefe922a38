use axum::{http::HeaderMap, middleware::Next, response::Response};

use crate::app::errors::json_error;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor";

/// Attach an [`ActorContext`] to the request; reject requests without one.
pub async fn actor_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let actor = match extract_actor(req.headers()) {
        Some(a) => a,
        None => {
            return json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "missing_actor",
                format!("the {ACTOR_HEADER} header is required"),
            );
        }
    };
    req.extensions_mut().insert(ActorContext::new(actor));
    next.run(req).await
}

fn extract_actor(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(ACTOR_HEADER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_string())
}
