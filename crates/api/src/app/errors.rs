use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;

use jobshift_live::{ForwardError, ProxyError, Route, SessionError};

use crate::app::ROUTED_HEADER;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn session_error_to_response(err: SessionError) -> axum::response::Response {
    match err {
        SessionError::StateConflict { .. } => json_error(StatusCode::CONFLICT, "state_conflict", err.to_string()),
        SessionError::InvalidPercentage(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_percentage", err.to_string())
        }
        SessionError::MissingReason => json_error(StatusCode::BAD_REQUEST, "missing_reason", err.to_string()),
    }
}

/// Error for a job request. Routed failures carry the routing marker both
/// as a header and in the body.
pub fn proxy_error_to_response(err: ProxyError) -> axum::response::Response {
    let (status, code, routed) = match &err {
        ProxyError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", None),
        ProxyError::Translation(_) => (StatusCode::BAD_REQUEST, "translation_failed", Some(Route::Target)),
        ProxyError::Forward(ForwardError::Timeout(_)) => {
            (StatusCode::GATEWAY_TIMEOUT, "forward_timeout", Some(Route::Target))
        }
        ProxyError::Forward(_) => (StatusCode::BAD_GATEWAY, "forward_failed", Some(Route::Target)),
    };

    let Some(route) = routed else {
        return json_error(status, code, err.to_string());
    };
    let mut response = (
        status,
        axum::Json(json!({
            "error": code,
            "message": err.to_string(),
            "routed": route.as_str(),
        })),
    )
        .into_response();
    tag_route(&mut response, route);
    response
}

pub fn tag_route(response: &mut axum::response::Response, route: Route) {
    response.headers_mut().insert(
        HeaderName::from_static(ROUTED_HEADER),
        HeaderValue::from_static(route.as_str()),
    );
}

pub fn invalid_body(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", message)
}
