//! Content negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! Accept header + produced types of the surviving bindings
//!     → media.rs (parse ranges, keyword/family equivalence)
//!     → negotiator.rs (rank, match, dedupe)
//!     → ordered MIME strings, handed back to the dispatcher
//! ```

pub mod media;
pub mod negotiator;

pub use media::{canonical_mime, equivalent, MediaRange};
pub use negotiator::Negotiator;
