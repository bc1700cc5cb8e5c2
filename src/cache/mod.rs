//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint call:
//!     → store.rs (get_or_insert under the fetch lock)
//!     → storage.rs (Cache<T>: MemoryCache | BoundedCache | custom)
//!
//! Consumers (observe / keep_in_cache):
//!     → retention.rs (count++, cancel eviction)
//!     → release: count-- → timer → delete if still unused
//!
//! Invalidation:
//!     → store.rs (reset generation, clear entries + registrations)
//!     → emit CacheClear(previous generation) to listeners
//! ```
//!
//! # Design Decisions
//! - Entries are shared futures, so pending and settled results share one slot
//! - Failed results are cached like successful ones until invalidated
//! - Generations use a process-wide epoch so stores can be compared

pub mod generation;
pub mod retention;
pub mod storage;
pub mod store;

pub use generation::{CacheGeneration, Epoch, GenerationCell};
pub use retention::Retention;
pub use storage::{BoundedCache, Cache, MemoryCache};
pub use store::{CacheEvent, CacheStore, ClearListener, Invalidation, DEFAULT_EVICTION_TIMEOUT};
