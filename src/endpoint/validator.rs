//! Cache validators.
//!
//! A validator runs before every cache lookup and may force a fresh fetch by
//! returning `false`.

use std::sync::Arc;

use crate::cache::{CacheStore, GenerationCell};
use crate::transport::Headers;

/// What a validator sees for one call.
pub struct ValidationContext<'a, K, T> {
    pub keys: &'a K,
    pub url: &'a str,
    pub headers: &'a Headers,
    pub cache_key: &'a str,
    pub store: &'a CacheStore<K, T>,
}

pub type CacheValidator<K, T> = Arc<dyn Fn(&ValidationContext<'_, K, T>) -> bool + Send + Sync>;

/// Invalidate the validated endpoint whenever `upstream` holds newer data.
///
/// Used by derived endpoints whose responses embed data of another endpoint:
/// once the upstream cache has been refreshed (its generation is newer than
/// ours), our cache is dropped and the call fetches again.
pub fn upstream<K, T>(upstream: GenerationCell) -> CacheValidator<K, T>
where
    K: 'static,
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |ctx: &ValidationContext<'_, K, T>| {
        let (Some(theirs), Some(ours)) = (upstream.get(), ctx.store.generation()) else {
            return true;
        };
        if theirs.is_newer_than(&ours) {
            tracing::debug!(
                upstream_epoch = theirs.epoch,
                epoch = ours.epoch,
                cache_key = %ctx.cache_key,
                "Upstream cache is newer, invalidating"
            );
            // Listener reactions are already spawned; nothing to await here.
            drop(ctx.store.invalidate());
        }
        true
    })
}
