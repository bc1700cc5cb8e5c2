//! Endpoint subsystem.
//!
//! # Data Flow
//! ```text
//! endpoint.call(keys[, body])
//!     → core.rs: derive url/headers/cache key (keys module)
//!     → validator.rs: optional cache validator
//!     → cache store: hit → shared future
//!                    miss → start fetch, store it immediately
//!     → fetch task: loader.rs (HttpLoader → resolution protocol → transport)
//!                   hooks.rs (after_success / after_error)
//!     → every caller awaits the same RequestFuture<T>
//!
//! observe.rs: retain + invoke + re-invoke on CacheClear
//! ```
//!
//! # Design Decisions
//! - The loader is a strategy behind `ArcSwap`, so mocks can replace it
//!   without touching the endpoint
//! - GET endpoints cache by default; POST/PUT/DELETE opt in
//! - Verb types fix the `call` signature and deref to the shared `Endpoint`

pub mod builder;
pub mod core;
pub mod hooks;
pub mod loader;
pub mod observe;
pub mod validator;
pub mod verbs;

pub use builder::EndpointBuilder;
pub use core::Endpoint;
pub use hooks::{ErrorHook, SuccessHook};
pub use loader::{decode_body, loader_fn, FnLoader, HttpLoader, LoadRequest, Loader, SharedLoader};
pub use observe::{EndpointState, Observation, StateObservation};
pub use validator::{upstream, CacheValidator, ValidationContext};
pub use verbs::{DeleteEndpoint, GetEndpoint, PostEndpoint, PutEndpoint};
