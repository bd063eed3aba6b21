//! Network access for the offline worker.
//!
//! The worker only ever talks to the network through the [`Fetcher`] trait so
//! tests and embedders can swap in their own transport. [`HttpFetcher`] is the
//! production implementation on top of reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::{CacheMode, FetchError, Request, Response};

/// HTTP request timeout in seconds.
/// Large shell bundles such as `main.dart.js` can be several megabytes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("shellcache/", env!("CARGO_PKG_VERSION"));

/// Fetch a resource by request identity.
///
/// `Ok` carries any HTTP response, including error statuses; `Err` means no
/// response was obtained at all.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    fn cache_headers(mode: CacheMode) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if mode == CacheMode::Reload {
            headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
            headers.insert(header::PRAGMA, header::HeaderValue::from_static("no-cache"));
        }
        headers
    }

    fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::cache_headers(request.cache_mode))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FetchError::Unreachable(request.url.to_string())
                } else {
                    FetchError::NetworkError(e)
                }
            })?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();
        debug!(url = %request.url, status, bytes = body.len(), "Fetched resource");

        Ok(Response {
            url: request.url.to_string(),
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_sets_no_cache_headers() {
        let headers = HttpFetcher::cache_headers(CacheMode::Reload);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");

        assert!(HttpFetcher::cache_headers(CacheMode::Default).is_empty());
    }

    #[test]
    fn test_collect_headers_skips_non_ascii_values() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/html"));
        headers.insert(
            header::ETAG,
            header::HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );

        let collected = HttpFetcher::collect_headers(&headers);
        assert_eq!(collected.get("content-type").map(String::as_str), Some("text/html"));
        assert!(!collected.contains_key("etag"));
    }
}
