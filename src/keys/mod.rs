//! Cache key derivation.
//!
//! # Data Flow
//! ```text
//! keys (caller value)
//!     → UrlTemplate::render              → url
//!     → HeaderTemplate (literal | fn)    → headers + fragment
//!     → derive_cache_key(url, fragment)  → "<fragment> - <url>"
//! ```
//!
//! # Design Decisions
//! - Derivation is pure; it never touches storage
//! - Only values that reach the wire (URL, header values) feed the key, so
//!   unrelated key fields never split the cache
//! - Header values are JSON-encoded before concatenation so that values
//!   containing quotes cannot collide

pub mod deriver;
pub mod template;

pub use deriver::{derive_cache_key, DerivedHeaders, DerivedRequest, KeyDeriver};
pub use template::{HeaderTemplate, HeaderValue, UrlTemplate};
