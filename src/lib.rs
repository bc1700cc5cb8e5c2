//! Declarative HTTP endpoints with request dedup, reference-counted caching
//! and resolver-driven retries.

pub mod cache;
pub mod config;
pub mod emitter;
pub mod endpoint;
pub mod error;
pub mod future;
pub mod keys;
mod lock;
pub mod mock;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod transport;

pub use cache::{CacheEvent, CacheGeneration, Retention};
pub use config::RegistryConfig;
pub use endpoint::{
    loader_fn, DeleteEndpoint, Endpoint, EndpointState, GetEndpoint, Loader, Observation, PostEndpoint,
    PutEndpoint, StateObservation,
};
pub use error::{ErrorDetails, RequestError, RequestResult};
pub use future::RequestFuture;
pub use registry::RequestRegistry;
pub use resilience::{ErrorEmitter, ErrorEvent, ErrorReporter, Handling, ResolutionPolicy};
pub use transport::{Method, ReqwestTransport, Transport};
