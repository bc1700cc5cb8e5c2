//! URL and header templates.

use std::fmt::Display;
use std::sync::Arc;

use crate::error::{RequestError, RequestResult};

type BuildFn<K> = dyn Fn(&K) -> RequestResult<String> + Send + Sync;

fn fallible<K, F, E>(build: F) -> Arc<BuildFn<K>>
where
    F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
    E: Display,
{
    Arc::new(move |keys: &K| build(keys).map_err(|e| RequestError::Derivation(e.to_string())))
}

/// Builds the request URL from an endpoint's keys.
pub struct UrlTemplate<K> {
    build: Arc<BuildFn<K>>,
}

impl<K> UrlTemplate<K> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(move |keys: &K| Ok(build(keys))),
        }
    }

    /// A URL builder that may refuse some keys.
    pub fn try_new<F, E>(build: F) -> Self
    where
        F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
        E: Display,
    {
        Self {
            build: fallible(build),
        }
    }

    pub fn render(&self, keys: &K) -> RequestResult<String> {
        (self.build)(keys)
    }
}

impl<K> Clone for UrlTemplate<K> {
    fn clone(&self) -> Self {
        Self {
            build: self.build.clone(),
        }
    }
}

/// A header value: fixed, or computed from the keys at call time.
pub enum HeaderValue<K> {
    Literal(String),
    Derived(Arc<BuildFn<K>>),
}

impl<K> HeaderValue<K> {
    pub fn derived<F>(build: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        HeaderValue::Derived(Arc::new(move |keys: &K| Ok(build(keys))))
    }

    pub fn try_derived<F, E>(build: F) -> Self
    where
        F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
        E: Display,
    {
        HeaderValue::Derived(fallible(build))
    }

    pub fn resolve(&self, keys: &K) -> RequestResult<String> {
        match self {
            HeaderValue::Literal(value) => Ok(value.clone()),
            HeaderValue::Derived(build) => build(keys),
        }
    }
}

impl<K> Clone for HeaderValue<K> {
    fn clone(&self) -> Self {
        match self {
            HeaderValue::Literal(value) => HeaderValue::Literal(value.clone()),
            HeaderValue::Derived(build) => HeaderValue::Derived(build.clone()),
        }
    }
}

impl<K> From<&str> for HeaderValue<K> {
    fn from(value: &str) -> Self {
        HeaderValue::Literal(value.to_string())
    }
}

impl<K> From<String> for HeaderValue<K> {
    fn from(value: String) -> Self {
        HeaderValue::Literal(value)
    }
}

/// Declared headers in declaration order.
pub struct HeaderTemplate<K> {
    entries: Vec<(String, HeaderValue<K>)>,
}

impl<K> HeaderTemplate<K> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Declare a header. Redeclaring a name replaces its value but keeps its
    /// original position.
    pub fn insert(&mut self, name: impl Into<String>, value: HeaderValue<K>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue<K>)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for HeaderTemplate<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for HeaderTemplate<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}
