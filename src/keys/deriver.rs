//! Cache key derivation.

use serde_json::Value;

use crate::error::RequestResult;
use crate::keys::template::{HeaderTemplate, UrlTemplate};
use crate::transport::Headers;

/// Resolved headers plus their cache-key fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedHeaders {
    /// JSON-encoded header values concatenated in declaration order.
    pub fragment: String,
    pub headers: Headers,
}

/// Everything needed to issue and cache one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRequest {
    pub url: String,
    pub headers: Headers,
    pub cache_key: String,
}

/// Join a header fragment and a URL into a cache key.
pub fn derive_cache_key(url: &str, header_fragment: &str) -> String {
    format!("{} - {}", header_fragment, url)
}

/// Turns endpoint keys into a URL, headers and a cache key.
pub struct KeyDeriver<K> {
    url: UrlTemplate<K>,
    headers: HeaderTemplate<K>,
}

impl<K> KeyDeriver<K> {
    pub fn new(url: UrlTemplate<K>, headers: HeaderTemplate<K>) -> Self {
        Self { url, headers }
    }

    pub fn derive_url(&self, keys: &K) -> RequestResult<String> {
        self.url.render(keys)
    }

    pub fn derive_headers(&self, keys: &K) -> RequestResult<DerivedHeaders> {
        let mut headers = Headers::new();
        let mut fragment = String::new();
        for (name, template) in self.headers.iter() {
            let value = template.resolve(keys)?;
            fragment.push_str(&Value::String(value.clone()).to_string());
            headers.insert(name, value);
        }
        Ok(DerivedHeaders { fragment, headers })
    }

    /// Resolve URL, headers and cache key in one pass.
    pub fn derive(&self, keys: &K) -> RequestResult<DerivedRequest> {
        let url = self.derive_url(keys)?;
        let DerivedHeaders { fragment, headers } = self.derive_headers(keys)?;
        let cache_key = derive_cache_key(&url, &fragment);
        Ok(DerivedRequest {
            url,
            headers,
            cache_key,
        })
    }

    pub fn cache_key(&self, keys: &K) -> RequestResult<String> {
        self.derive(keys).map(|derived| derived.cache_key)
    }

    pub fn header_template(&self) -> &HeaderTemplate<K> {
        &self.headers
    }
}
