//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, HTTP request → RouteRequest)
//!     → routing::Router::dispatch (select binding)
//!     → auth check, handler invocation
//!     → response.rs (encode result or map error to status)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_IDENTITY, X_REQUEST_ID};
pub use server::{HttpServer, ROUTES_INDEX};
