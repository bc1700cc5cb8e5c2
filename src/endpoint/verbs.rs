//! Verb-specific endpoint types.
//!
//! Each verb wraps an [`Endpoint`] and fixes the shape of `call`: GET and
//! DELETE take only keys, POST and PUT also take a body. Everything else
//! (cache control, loader replacement, observation) is reached through
//! `Deref`.

use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::endpoint::builder::EndpointBuilder;
use crate::endpoint::core::Endpoint;
use crate::future::RequestFuture;
use crate::keys::UrlTemplate;
use crate::transport::Method;

macro_rules! verb_endpoint {
    (
        $(#[$meta:meta])*
        $name:ident<K, T>, $method:expr
    ) => {
        $(#[$meta])*
        pub struct $name<K, T> {
            endpoint: Endpoint<K, (), T>,
        }

        impl<K, T> $name<K, T>
        where
            K: Clone + Send + Sync + 'static,
            T: DeserializeOwned + Clone + Send + Sync + 'static,
        {
            pub fn builder<F>(url: F) -> EndpointBuilder<K, (), T, Self>
            where
                F: Fn(&K) -> String + Send + Sync + 'static,
            {
                EndpointBuilder::new($method, UrlTemplate::new(url))
            }

            /// Like `builder`, for URL builders that may refuse some keys.
            pub fn try_url<F, E>(url: F) -> EndpointBuilder<K, (), T, Self>
            where
                F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
                E: std::fmt::Display,
            {
                EndpointBuilder::new($method, UrlTemplate::try_new(url))
            }

            pub fn call(&self, keys: K) -> RequestFuture<T> {
                self.endpoint.invoke(keys, None)
            }
        }

        verb_endpoint!(@common $name<K, (), T>, <K, T>);
    };

    (
        $(#[$meta:meta])*
        $name:ident<K, B, T>, $method:expr
    ) => {
        $(#[$meta])*
        pub struct $name<K, B, T> {
            endpoint: Endpoint<K, B, T>,
        }

        impl<K, B, T> $name<K, B, T>
        where
            K: Clone + Send + Sync + 'static,
            B: Serialize + Send + Sync + 'static,
            T: DeserializeOwned + Clone + Send + Sync + 'static,
        {
            pub fn builder<F>(url: F) -> EndpointBuilder<K, B, T, Self>
            where
                F: Fn(&K) -> String + Send + Sync + 'static,
            {
                EndpointBuilder::new($method, UrlTemplate::new(url))
            }

            /// Like `builder`, for URL builders that may refuse some keys.
            pub fn try_url<F, E>(url: F) -> EndpointBuilder<K, B, T, Self>
            where
                F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
                E: std::fmt::Display,
            {
                EndpointBuilder::new($method, UrlTemplate::try_new(url))
            }

            pub fn call(&self, keys: K, body: B) -> RequestFuture<T> {
                self.endpoint.invoke(keys, Some(body))
            }
        }

        verb_endpoint!(@common $name<K, B, T>, <K, B, T>);
    };

    (@common $name:ident<$k:ident, $b:ty, $t:ident>, <$($param:ident),*>) => {
        impl<$($param),*> Deref for $name<$($param),*> {
            type Target = Endpoint<$k, $b, $t>;

            fn deref(&self) -> &Self::Target {
                &self.endpoint
            }
        }

        impl<$($param),*> From<Endpoint<$k, $b, $t>> for $name<$($param),*> {
            fn from(endpoint: Endpoint<$k, $b, $t>) -> Self {
                Self { endpoint }
            }
        }

        impl<$($param),*> Clone for $name<$($param),*> {
            fn clone(&self) -> Self {
                Self {
                    endpoint: self.endpoint.clone(),
                }
            }
        }
    };
}

verb_endpoint! {
    /// Cached by default.
    GetEndpoint<K, T>, Method::Get
}

verb_endpoint! {
    DeleteEndpoint<K, T>, Method::Delete
}

verb_endpoint! {
    /// Sends a JSON body; not cached unless enabled.
    PostEndpoint<K, B, T>, Method::Post
}

verb_endpoint! {
    PutEndpoint<K, B, T>, Method::Put
}
