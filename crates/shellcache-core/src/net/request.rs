//! Request and response values exchanged between the worker, the network
//! and the cache stores.

use std::collections::BTreeMap;

use reqwest::Method;
use url::Url;

/// How the network layer should treat intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal fetch, intermediate caches may answer.
    #[default]
    Default,
    /// Force revalidation with the origin.
    Reload,
}

/// A request for a single resource. The URL is the request identity used as
/// the store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub cache_mode: CacheMode,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            cache_mode: CacheMode::Default,
        }
    }

    /// A GET that bypasses intermediate caches.
    pub fn reload(url: Url) -> Self {
        Self {
            cache_mode: CacheMode::Reload,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Store key for this request. Fragments never reach the network, so
    /// they are not part of the identity.
    pub fn key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// A fetched or cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// A 200 response carrying a JSON document.
    pub fn json(url: impl Into<String>, body: Vec<u8>) -> Self {
        let mut response = Self::new(url, 200, body);
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    /// True for 2xx statuses, the only responses worth caching.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }
}
