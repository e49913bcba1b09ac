//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use resource_router::config::RouterConfig;
use resource_router::lifecycle::Shutdown;
use resource_router::metadata::{MethodDeclaration, ParamDeclaration, TypeDeclaration, TypeRegistry};
use resource_router::negotiation::Negotiator;
use resource_router::service::{HandlerError, Invocation};
use resource_router::{DescriptorCache, HttpServer, Router, Service};

/// Declaration of a small catalog service.
pub fn catalog() -> TypeDeclaration {
    TypeDeclaration::new("Catalog")
        .doc("/**\n * @path /catalog\n * @produces json\n */")
        .method(
            MethodDeclaration::new("list")
                .doc("/**\n * @path /\n * @verbs GET\n * @query page\n */")
                .param(ParamDeclaration::new("page", "int").optional()),
        )
        .method(
            MethodDeclaration::new("show")
                .doc("/**\n * @path /:id:int\n * @verbs GET\n * @produces json\n * @produces xml\n */")
                .param(ParamDeclaration::new("id", "int")),
        )
        .method(
            MethodDeclaration::new("create")
                .doc("/**\n * @path /\n * @verbs POST\n * @accepts json\n * @bodyAll item\n * @identity owner\n * @auth required\n */")
                .param(ParamDeclaration::new("item", "string"))
                .param(ParamDeclaration::new("owner", "string")),
        )
        .method(
            MethodDeclaration::new("files")
                .doc("/**\n * @path /:id:int/files/:rest+\n * @verbs GET\n */")
                .param(ParamDeclaration::new("id", "int"))
                .param(ParamDeclaration::new("rest", "string[]")),
        )
}

/// Handlers for `catalog()`.
pub fn catalog_service() -> Service {
    Service::new("Catalog")
        .handler("list", |inv: &Invocation| Ok(json!({ "page": inv.arg(0) })))
        .handler("show", |inv: &Invocation| match inv.arg(0).as_i64() {
            Some(0) => Err(HandlerError::NotFound("item 0".into())),
            Some(id) if inv.content_type == "application/xml" => Ok(json!(format!("<item id=\"{}\"/>", id))),
            Some(id) => Ok(json!({ "id": id })),
            None => Err(HandlerError::InvalidInput("id".into())),
        })
        .handler("create", |inv: &Invocation| {
            Ok(json!({ "item": inv.arg(0), "owner": inv.identity }))
        })
        .handler("files", |inv: &Invocation| Ok(json!({ "id": inv.arg(0), "path": inv.arg(1) })))
}

/// Registry holding `decls`.
pub fn registry(decls: Vec<TypeDeclaration>) -> TypeRegistry {
    let registry = TypeRegistry::new();
    for decl in decls {
        registry.register(decl);
    }
    registry
}

/// Strict router over an in-memory cache.
pub fn router(decls: Vec<TypeDeclaration>) -> Router {
    Router::new(
        Arc::new(DescriptorCache::in_memory(registry(decls))),
        Negotiator::new(true),
        "application/json",
    )
}

/// Start a server for `router` on an ephemeral port.
pub async fn start_server(router: Router) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = RouterConfig::default();
    config.listener.bind_address = addr.to_string();
    config.timeouts.shutdown_secs = 1;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, router);
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}
