//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the descriptor cache for the configured persistent tier
//! - Register manifest types and bind services before serving
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Binding happens once, in manifest order, before the listener accepts

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::{CacheBackend, CacheConfig, RouterConfig, ServiceManifest};
use crate::metadata::declaration::TypeRegistry;
use crate::metadata::store::{CacheError, DescriptorStore, FileStore, MemoryStore, NullStore};
use crate::metadata::DescriptorCache;
use crate::negotiation::{canonical_mime, Negotiator};
use crate::routing::{RouteError, Router};
use crate::service::Service;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("descriptor store: {0}")]
    Cache(#[from] CacheError),

    #[error("binding: {0}")]
    Bind(#[from] RouteError),
}

/// Descriptor cache over `registry` with the configured persistent tier.
pub fn build_cache(config: &CacheConfig, registry: TypeRegistry) -> Result<DescriptorCache, StartupError> {
    let store: Arc<dyn DescriptorStore> = match config.backend {
        CacheBackend::None => Arc::new(NullStore),
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::File => {
            let dir = config.directory.clone().unwrap_or_default();
            Arc::new(FileStore::new(PathBuf::from(dir))?)
        }
    };
    tracing::info!(backend = ?config.backend, check_sources = config.check_sources, "Descriptor cache ready");
    Ok(DescriptorCache::new(registry, store).with_source_checks(config.check_sources))
}

/// Build a router from config and manifest, binding `services` first and
/// then every remaining manifest type without handlers.
pub fn build_router(
    config: &RouterConfig,
    manifest: &ServiceManifest,
    services: Vec<Service>,
) -> Result<Router, StartupError> {
    let cache = build_cache(&config.cache, manifest.registry())?;
    let default_produces = canonical_mime(&config.negotiation.default_produces)
        .unwrap_or_else(|| config.negotiation.default_produces.clone());
    let mut router = Router::new(
        Arc::new(cache),
        Negotiator::new(config.negotiation.strict),
        default_produces,
    );

    for service in services {
        router.bind(service)?;
    }
    for type_name in manifest.bound_types() {
        if !router.table().contains_type(&type_name) {
            router.bind_type(&type_name)?;
        }
    }

    tracing::info!(
        types = router.table().bound_types().count(),
        patterns = router.table().pattern_count(),
        bindings = router.table().binding_count(),
        "Router ready"
    );
    Ok(router)
}
