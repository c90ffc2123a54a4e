use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use jobshift_live::{MigrationProxy, Route, Routed, SessionState};
use tracing::warn;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/status", get(status))
        .route("/percentage", post(set_percentage))
        .route("/cutover", post(cutover))
        .route("/rollback", post(rollback))
}

/// Accept one job in the legacy framework's native format.
pub async fn submit_job(Extension(proxy): Extension<Arc<MigrationProxy>>, body: Body) -> axum::response::Response {
    let limit = proxy.max_body_bytes();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(limit, error = %e, "job body rejected");
            return errors::json_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("request body exceeds the {limit} byte limit"),
            );
        }
    };

    match proxy.handle_job(&bytes).await {
        Ok(Routed::Target(answer)) => {
            let status = StatusCode::from_u16(answer.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = (status, answer.body).into_response();
            if let Some(value) = answer.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            errors::tag_route(&mut response, Route::Target);
            response
        }
        Ok(Routed::Legacy { size }) => {
            let mut response = Json(dto::LegacyPassThrough {
                routed: Route::Legacy.as_str(),
                message: "job passed through without translation",
                size,
            })
            .into_response();
            errors::tag_route(&mut response, Route::Legacy);
            response
        }
        Err(e) => errors::proxy_error_to_response(e),
    }
}

pub async fn status(Extension(proxy): Extension<Arc<MigrationProxy>>) -> impl IntoResponse {
    Json(proxy.session().status())
}

/// Change the split. From `idle` this starts the dual run.
pub async fn set_percentage(
    Extension(proxy): Extension<Arc<MigrationProxy>>,
    body: Result<Json<dto::SetPercentageRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::invalid_body(rejection.body_text()),
    };

    let session = proxy.session();
    let result = match session.state() {
        SessionState::Idle => session.start_dual_run(body.percentage),
        _ => session.set_percentage(body.percentage),
    };
    match result {
        Ok(()) => Json(session.status()).into_response(),
        Err(e) => errors::session_error_to_response(e),
    }
}

pub async fn cutover(Extension(proxy): Extension<Arc<MigrationProxy>>) -> axum::response::Response {
    let session = proxy.session();
    match session.cutover() {
        Ok(()) => Json(dto::TransitionResponse {
            state: session.state(),
            percentage: session.percentage(),
            message: "all traffic now routed to the target system",
        })
        .into_response(),
        Err(e) => errors::session_error_to_response(e),
    }
}

/// The state check comes first: from `idle` this is a conflict whatever the
/// body says. Otherwise a missing or blank `reason` is rejected.
pub async fn rollback(
    Extension(proxy): Extension<Arc<MigrationProxy>>,
    body: Option<Json<dto::RollbackRequest>>,
) -> axum::response::Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let reason = body.reason.unwrap_or_default();

    let session = proxy.session();
    match session.rollback(&reason) {
        Ok(()) => Json(dto::TransitionResponse {
            state: session.state(),
            percentage: session.percentage(),
            message: "all traffic now routed to the legacy system",
        })
        .into_response(),
        Err(e) => errors::session_error_to_response(e),
    }
}
