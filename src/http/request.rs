//! Request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) and echo it on the response
//! - Translate an HTTP request into the router's `RouteRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Identity comes from a trusted upstream header; no credential checks here

use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

use crate::routing::RouteRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the authenticated identity.
pub const X_IDENTITY: &str = "x-identity";

/// Makes a fresh UUID v4 request ID when the client sent none.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(header::HeaderName::from_static(X_REQUEST_ID), UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(header::HeaderName::from_static(X_REQUEST_ID))
}

/// Request ID of an incoming request, `"unknown"` if missing.
pub fn request_id(headers: &HeaderMap) -> String {
    header_str(headers, X_REQUEST_ID).unwrap_or("unknown").to_string()
}

/// Build the router's view of a request.
pub fn route_request(parts: &Parts, body: Vec<u8>) -> RouteRequest {
    let mut request = RouteRequest::new(parts.method.as_str(), parts.uri.path()).body(body);
    if let Some(query) = parts.uri.query() {
        request = request.query(query);
    }
    if let Some(ct) = header_str(&parts.headers, header::CONTENT_TYPE.as_str()) {
        request = request.content_type(ct);
    }
    if let Some(accept) = header_str(&parts.headers, header::ACCEPT.as_str()) {
        request = request.accept(accept);
    }
    if let Some(identity) = header_str(&parts.headers, X_IDENTITY).filter(|v| !v.trim().is_empty()) {
        request = request.identity(identity.trim());
    }
    request
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_request_from_parts() {
        let (parts, _) = Request::builder()
            .method("post")
            .uri("/users/7/?verbose=1")
            .header("content-type", "application/json")
            .header("accept", "application/xml")
            .header("x-identity", "alice")
            .body(())
            .unwrap()
            .into_parts();

        let request = route_request(&parts, b"{}".to_vec());
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/users/7");
        assert_eq!(request.query.as_deref(), Some("verbose=1"));
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
        assert_eq!(request.accept.as_deref(), Some("application/xml"));
        assert_eq!(request.identity.as_deref(), Some("alice"));
        assert_eq!(request.body, b"{}");
    }

    #[test]
    fn test_escaped_path_is_decoded_per_segment() {
        let (parts, _) = Request::builder()
            .uri("/users/john%20doe/a%2Fb")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(route_request(&parts, Vec::new()).path, "/users/john doe/a%2Fb");
    }

    #[test]
    fn test_blank_identity_is_absent() {
        let (parts, _) = Request::builder()
            .uri("/")
            .header("x-identity", "  ")
            .body(())
            .unwrap()
            .into_parts();
        assert!(route_request(&parts, Vec::new()).identity.is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let request = Request::new(());
        let mut make = UuidRequestId;
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
