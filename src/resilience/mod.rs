//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! HttpLoader:
//!     → retries.rs (send through the transport)
//!     → 2xx: done
//!     → otherwise: resolution.rs (broadcast ErrorEvent to resolvers)
//!         → resolve(name): record attempt, send again
//!         → reject(): RequestError::Rejected
//!         → nobody settles: RequestError::Unhandled
//!
//! Consumers:
//!     → report.rs (forward each distinct failure once)
//! ```
//!
//! # Design Decisions
//! - Recovery is delegated to named resolvers (token refresh, login prompt)
//!   rather than fixed retry counts
//! - Resolvers see which strategies were already tried and are expected to
//!   stop escalating themselves; an opt-in attempt cap exists as a backstop

pub mod report;
pub mod resolution;
pub mod retries;

pub use report::ErrorReporter;
pub use resolution::{ErrorEmitter, ErrorEvent, ErrorListener, Handling, ResolutionHandle};
pub use retries::{parse_error_content, send_with_resolution, ResolutionPolicy};
