//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: one catch-all handler plus the route index
//! - Wire up middleware (tracing, timeout, request ID)
//! - Translate requests, dispatch, enforce auth, invoke, encode
//! - Serve until shutdown, then drain within a deadline

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router as AxumRouter,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RouterConfig;
use crate::http::request::{propagate_request_id_layer, request_id, route_request, set_request_id_layer};
use crate::http::response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{AuthMode, Dispatch, RouteRequest, Router, Selection};

/// Path of the JSON route index.
pub const ROUTES_INDEX: &str = "/_routes";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub max_body_bytes: usize,
}

/// HTTP front end for a bound router.
pub struct HttpServer {
    app: AxumRouter,
    shutdown_grace: Duration,
}

impl HttpServer {
    pub fn new(config: &RouterConfig, router: Router) -> Self {
        let state = AppState {
            router: Arc::new(router),
            max_body_bytes: config.listener.max_body_bytes,
        };
        Self {
            app: Self::build_router(config, state),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, state: AppState) -> AxumRouter {
        AxumRouter::new()
            .route(ROUTES_INDEX, get(routes_index))
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The Axum application, for embedding or testing.
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let grace = self.shutdown_grace;
        let drained = shutdown.wait();
        let deadline = async move {
            drained.await;
            tokio::time::sleep(grace).await;
        };
        let server = axum::serve(listener, self.app).with_graceful_shutdown(shutdown.wait());
        let server = async move { server.await };

        tokio::select! {
            result = server => result?,
            _ = deadline => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Shutdown deadline reached, dropping in-flight requests"
            ),
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn routes_index(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.router.routes())
}

/// Catch-all handler: every request goes through the resource router.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let method = parts.method.to_string();

    let response = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => respond(&state.router, &route_request(&parts, bytes.to_vec()), &request_id),
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body rejected");
            response::payload_too_large(state.max_body_bytes)
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

fn respond(router: &Router, request: &RouteRequest, request_id: &str) -> Response {
    let selection = match router.dispatch(request) {
        Ok(Dispatch::Invoke(selection)) => selection,
        Ok(Dispatch::Options { allow }) => return response::options(&allow),
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(request_id = %request_id, error = %e, "Routing failed");
            }
            return response::route_error(&e);
        }
    };

    if selection.binding.auth_mode == AuthMode::Required && selection.identity.is_none() {
        tracing::debug!(request_id = %request_id, binding = %selection.binding, "Missing identity");
        return response::unauthorized();
    }

    match selection.invoke() {
        Some(Ok(value)) => response::encode(value, &selection.content_type),
        Some(Err(e)) => {
            tracing::warn!(request_id = %request_id, binding = %selection.binding, error = %e, "Handler failed");
            response::handler_error(&e)
        }
        None => echo(&selection),
    }
}

/// Types bound without handlers answer with the dispatch decision itself.
fn echo(selection: &Selection) -> Response {
    let body = json!({
        "target": selection.binding.target_type,
        "method": selection.binding.method_name,
        "arguments": selection.arguments,
        "content_type": selection.content_type,
    });
    response::encode(body, "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DescriptorCache, MethodDeclaration, TypeDeclaration, TypeRegistry};
    use crate::negotiation::Negotiator;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDeclaration::new("Admin")
                .method(MethodDeclaration::new("stats").doc("/**\n * @path /stats\n * @auth required\n */")),
        );
        let mut router = Router::new(
            Arc::new(DescriptorCache::in_memory(registry)),
            Negotiator::new(true),
            "application/json",
        );
        router.bind_type("Admin").unwrap();
        HttpServer::new(&RouterConfig::default(), router)
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let response = server()
            .app()
            .oneshot(Request::builder().uri(ROUTES_INDEX).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed() {
        let response = server()
            .app()
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .header("x-request-id", "abc-123")
                    .header("x-identity", "ops")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let response = server()
            .app()
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = RouterConfig::default();
        config.listener.max_body_bytes = 4;
        let router = Router::new(
            Arc::new(DescriptorCache::in_memory(TypeRegistry::new())),
            Negotiator::new(true),
            "application/json",
        );
        let response = HttpServer::new(&config, router)
            .app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/anything")
                    .body(Body::from("far too long"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
