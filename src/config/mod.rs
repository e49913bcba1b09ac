//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! router config (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!
//! service manifest (TOML, [[types]])
//!     → loader.rs → validation.rs
//!     → ServiceManifest::registry() → TypeRegistry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_manifest, ConfigError};
pub use schema::{CacheBackend, CacheConfig, ListenerConfig, RouterConfig, ServiceManifest};
