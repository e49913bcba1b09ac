//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at bind time):
//!     ObjectDescriptor
//!     → binding.rs (directives → Binding per template × produced type)
//!     → template.rs (path template → anchored regex + counts)
//!     → table.rs (group by pattern, sort by specificity)
//!
//! Incoming Request (method, path, headers, body)
//!     → dispatcher.rs (filter, negotiate, select)
//!     → arguments.rs (path/query/body/identity → typed values)
//!     → Return: Dispatch or RouteError
//! ```
//!
//! # Design Decisions
//! - Routes compiled before serving, immutable at runtime
//! - Deterministic: same table and request always select the same binding
//! - Most specific pattern wins; greedy patterns are tried last

pub mod arguments;
pub mod binding;
pub mod dispatcher;
pub mod error;
pub mod table;
pub mod template;

pub use arguments::RouteRequest;
pub use binding::{AuthMode, Binding};
pub use dispatcher::{Dispatch, InheritanceOptions, RouteSummary, Router, Selection};
pub use error::{RouteError, RouteResult};
pub use table::RoutingTable;
pub use template::CompiledTemplate;
