//! Declaration metadata subsystem.
//!
//! # Data Flow
//! ```text
//! TypeDeclaration (builder or TOML manifest)
//!     → TypeRegistry (lookup by name)
//!     → parser.rs (doc block → ordered MetadataEntry list)
//!     → descriptor.rs (ObjectDescriptor per type, ancestors merged)
//!     → cache.rs (in-process table → persistent store → rebuild)
//! ```
//!
//! # Design Decisions
//! - Parsing is pure and uncached; only descriptors are memoized
//! - Persistent entries carry source stamps and are re-validated on read
//! - Cache services are constructed explicitly and injected, never global

pub mod cache;
pub mod declaration;
pub mod descriptor;
pub mod parser;
pub mod source;
pub mod store;

pub use cache::DescriptorCache;
pub use declaration::{MethodDeclaration, ParamDeclaration, TypeDeclaration, TypeRegistry, RESERVED_NAMESPACE};
pub use descriptor::{MethodDescriptor, ObjectDescriptor};
pub use parser::{parse_block, MetadataEntry};
pub use store::{CacheError, DescriptorStore, FileStore, MemoryStore, NullStore};
