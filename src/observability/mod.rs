//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Each fetch runs in a `request` span carrying a UUID v4 request ID
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - Both are opt-in for library users; the CLI installs them from config

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
