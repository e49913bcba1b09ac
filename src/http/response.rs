//! Response construction.
//!
//! # Responsibilities
//! - Map routing and handler errors to HTTP status codes with a JSON body
//! - Write handler results in the negotiated representation
//!
//! # Design Decisions
//! - JSON-family types are encoded with serde_json
//! - String results are written verbatim under any negotiated type
//! - Structured results under a non-JSON type are a server error; there
//!   is no XML or PHP encoder

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::negotiation::media::{family, Family};
use crate::routing::RouteError;
use crate::service::HandlerError;

fn error_body(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({ "error": kind, "message": message });
    (status, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn route_error(err: &RouteError) -> Response {
    let mut response = error_body(status(err.status_code()), err.kind(), &err.to_string());
    if let RouteError::MethodNotAllowed { allowed, .. } = err {
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            response.headers_mut().insert(header::ALLOW, value);
        }
    }
    response
}

pub fn handler_error(err: &HandlerError) -> Response {
    let kind = match err {
        HandlerError::InvalidInput(_) => "invalid_input",
        HandlerError::NotFound(_) => "not_found",
        HandlerError::Internal(_) => "handler_failed",
    };
    error_body(status(err.status_code()), kind, &err.to_string())
}

pub fn payload_too_large(limit: usize) -> Response {
    error_body(
        StatusCode::PAYLOAD_TOO_LARGE,
        "payload_too_large",
        &format!("request body exceeds {} bytes", limit),
    )
}

pub fn unauthorized() -> Response {
    error_body(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required")
}

/// `204` with an `Allow` header.
pub fn options(allow: &[String]) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

/// Encode `value` as `content_type`.
pub fn encode(value: Value, content_type: &str) -> Response {
    let body = match (&value, family(content_type)) {
        (_, Some(Family::Json)) => value.to_string(),
        (Value::String(s), _) => s.clone(),
        (Value::Null, _) => String::new(),
        _ => {
            tracing::error!(content_type = %content_type, "No encoder for structured result");
            return error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "no_encoder",
                &format!("cannot encode a structured result as `{}`", content_type),
            );
        }
    };

    let mut response = (StatusCode::OK, body).into_response();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_status_and_allow() {
        let err = RouteError::MethodNotAllowed {
            method: "PUT".into(),
            allowed: vec!["GET".into(), "POST".into()],
        };
        let response = route_error(&err);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");

        let response = route_error(&RouteError::NotAcceptable("x".into()));
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_encode() {
        let response = encode(json!({"a": 1}), "application/hal+json");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/hal+json");

        let response = encode(json!("<a/>"), "application/xml");
        assert_eq!(response.status(), StatusCode::OK);

        let response = encode(json!({"a": 1}), "application/xml");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_options_allow_header() {
        let response = options(&["GET".into(), "OPTIONS".into()]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");
    }
}
