//! Resource router library.
//!
//! Exposes plain service objects as HTTP resources. Types declare their
//! routes in doc-comment metadata; the router compiles that metadata into a
//! routing table, selects one binding per request, negotiates the response
//! representation and extracts typed arguments.
//!
//! # Architecture Overview
//!
//! ```text
//!   TypeDeclaration ──▶ metadata ──▶ ObjectDescriptor ──▶ routing::binding
//!   (builder/TOML)      (parse,       (cached, stamped)     (compile templates)
//!                        merge)                                   │
//!                                                                 ▼
//!   HTTP request ──▶ http ──▶ RouteRequest ──▶ routing::Router ◀── RoutingTable
//!                                                  │
//!                                  negotiation ◀───┤
//!                                                  ▼
//!                                  Selection (binding, arguments, content type)
//!                                                  │
//!                                   service handler ─▶ http::response
//! ```

// Core subsystems
pub mod metadata;
pub mod negotiation;
pub mod routing;
pub mod service;

// Outer surfaces
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use metadata::{DescriptorCache, TypeDeclaration, TypeRegistry};
pub use routing::{Dispatch, RouteError, RouteRequest, Router};
pub use service::{HandlerError, Invocation, Service};
