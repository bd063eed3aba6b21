//! Fetch-event handling.

use anyhow::Result;
use tracing::{debug, trace, warn};

use super::{keys, ShellWorker};
use crate::cache::CONTENT_STORE;
use crate::manifest::ROOT_KEY;
use crate::net::{Request, Response};

/// What the worker did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller should apply default network handling.
    Passthrough,
    /// Answered from the content store.
    Cache(Response),
    /// Answered from the network.
    Network(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Cache(r) | FetchOutcome::Network(r) => Some(r),
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough => "passthrough",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
        }
    }
}

impl ShellWorker {
    /// Serve a request. Only GET requests for manifest resources are
    /// intercepted; the document root goes online-first, everything else
    /// cache-first with lazy population.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if !request.is_get() {
            return Ok(FetchOutcome::Passthrough);
        }
        let Some(key) = keys::request_key(&self.origin_prefix, request.url.as_str()) else {
            trace!(url = %request.url, "Foreign origin, not intercepting");
            return Ok(FetchOutcome::Passthrough);
        };
        if !self.manifest().contains(&key) {
            trace!(url = %request.url, key = %key, "Not a manifest resource, not intercepting");
            return Ok(FetchOutcome::Passthrough);
        }

        if key == ROOT_KEY {
            self.online_first(request).await
        } else {
            self.cache_first(request).await
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
        let store_key = request.key();
        if let Some(cached) = self.storage.get(CONTENT_STORE, &store_key).await? {
            return Ok(FetchOutcome::Cache(cached.response));
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_ok() {
            self.store_copy(&store_key, &response).await;
        }
        Ok(FetchOutcome::Network(response))
    }

    async fn online_first(&self, request: &Request) -> Result<FetchOutcome> {
        let store_key = request.key();
        match self.fetcher.fetch(request).await {
            // Any response that arrives replaces the stored copy
            Ok(response) => {
                self.store_copy(&store_key, &response).await;
                Ok(FetchOutcome::Network(response))
            }
            Err(network_err) => {
                debug!(url = %request.url, error = %network_err, "Network failed, falling back to cache");
                match self.storage.get(CONTENT_STORE, &store_key).await {
                    Ok(Some(cached)) => Ok(FetchOutcome::Cache(cached.response)),
                    Ok(None) => Err(network_err.into()),
                    Err(e) => {
                        warn!(url = %request.url, error = %e, "Cache lookup failed after network failure");
                        Err(network_err.into())
                    }
                }
            }
        }
    }

    /// Concurrent writers may race here; entries are content-equivalent, so
    /// the last write wins.
    async fn store_copy(&self, store_key: &str, response: &Response) {
        if let Err(e) = self.storage.put(CONTENT_STORE, store_key, response).await {
            warn!(url = store_key, error = %e, "Failed to cache response");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;
    use url::Url;

    use super::*;
    use crate::cache::{CacheStorage, MemoryStorage};
    use crate::net::FetchError;
    use crate::worker::testing::{bundle_v1, serve_bundle, url, worker, StubFetcher};

    fn get(u: &str) -> Request {
        Request::get(Url::parse(u).unwrap())
    }

    fn setup() -> (Arc<MemoryStorage>, Arc<StubFetcher>, crate::worker::ShellWorker) {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = StubFetcher::new();
        let bundle = bundle_v1();
        serve_bundle(&fetcher, &bundle);
        let w = worker(bundle, storage.clone(), fetcher.clone());
        (storage, fetcher, w)
    }

    #[tokio::test]
    async fn test_non_get_is_not_intercepted() {
        let (_, fetcher, w) = setup();
        let request = get(&url("main.dart.js")).with_method(Method::POST);
        assert_eq!(w.handle_fetch(&request).await.unwrap(), FetchOutcome::Passthrough);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unlisted_key_is_not_intercepted() {
        let (storage, fetcher, w) = setup();
        for u in [
            url("api/products?page=2"),
            "https://payments.example.net/v1/intent".to_string(),
        ] {
            assert_eq!(w.handle_fetch(&get(&u)).await.unwrap(), FetchOutcome::Passthrough);
        }
        assert_eq!(fetcher.call_count(), 0);
        assert!(!storage.has(CONTENT_STORE).await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_first_populates_lazily() {
        let (storage, fetcher, w) = setup();
        let request = get(&url("assets/images/logo.png"));

        let first = w.handle_fetch(&request).await.unwrap();
        assert!(matches!(first, FetchOutcome::Network(ref r) if r.body == b"body:logo-1"));
        assert!(storage
            .get(CONTENT_STORE, &url("assets/images/logo.png"))
            .await
            .unwrap()
            .is_some());

        let second = w.handle_fetch(&request).await.unwrap();
        assert!(matches!(second, FetchOutcome::Cache(ref r) if r.body == b"body:logo-1"));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let (storage, fetcher, w) = setup();
        fetcher.serve_status("icons/Icon-192.png", 503, "busy");

        let outcome = w.handle_fetch(&get(&url("icons/Icon-192.png"))).await.unwrap();
        assert_eq!(outcome.response().unwrap().status, 503);
        assert!(storage.keys(CONTENT_STORE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_network_failure_propagates() {
        let (_, fetcher, w) = setup();
        fetcher.set_offline(true);
        let err = w.handle_fetch(&get(&url("main.dart.js"))).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_versioned_request_matches_manifest_key() {
        let (storage, fetcher, w) = setup();
        fetcher.serve("main.dart.js?v=42", "body:main-1");
        let outcome = w.handle_fetch(&get(&format!("{}?v=42", url("main.dart.js")))).await.unwrap();
        assert_eq!(outcome.source(), "network");
        // Stored under the request identity, query included
        assert!(storage
            .get(CONTENT_STORE, &format!("{}?v=42", url("main.dart.js")))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_root_goes_network_first_even_when_cached() {
        let (storage, fetcher, w) = setup();
        storage
            .put(CONTENT_STORE, &url(ROOT_KEY), &Response::new(url(ROOT_KEY), 200, b"stale".to_vec()))
            .await
            .unwrap();

        let outcome = w.handle_fetch(&get(&url(ROOT_KEY))).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Network(ref r) if r.body == b"body:index-1"));
        assert_eq!(fetcher.calls(), vec![url(ROOT_KEY)]);

        let refreshed = storage.get(CONTENT_STORE, &url(ROOT_KEY)).await.unwrap().unwrap();
        assert_eq!(refreshed.response.body, b"body:index-1");
    }

    #[tokio::test]
    async fn test_root_stores_whatever_the_network_returns() {
        let (storage, fetcher, w) = setup();
        storage
            .put(CONTENT_STORE, &url(ROOT_KEY), &Response::new(url(ROOT_KEY), 200, b"good".to_vec()))
            .await
            .unwrap();
        fetcher.serve_status(ROOT_KEY, 503, "maintenance");

        let outcome = w.handle_fetch(&get(&url(ROOT_KEY))).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Network(ref r) if r.status == 503));

        let stored = storage.get(CONTENT_STORE, &url(ROOT_KEY)).await.unwrap().unwrap();
        assert_eq!(stored.response.status, 503);
        assert_eq!(stored.response.body, b"maintenance");
    }

    #[tokio::test]
    async fn test_root_falls_back_to_cache_when_offline() {
        let (storage, fetcher, w) = setup();
        storage
            .put(CONTENT_STORE, &url(ROOT_KEY), &Response::new(url(ROOT_KEY), 200, b"cached".to_vec()))
            .await
            .unwrap();
        fetcher.set_offline(true);

        // Hash routes resolve to the root document
        let outcome = w.handle_fetch(&get(&format!("{}#/cart", url(ROOT_KEY)))).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Cache(ref r) if r.body == b"cached"));
    }

    #[tokio::test]
    async fn test_root_offline_without_cache_surfaces_network_error() {
        let (_, fetcher, w) = setup();
        fetcher.set_offline(true);

        let err = w.handle_fetch(&get(&url(ROOT_KEY))).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::Unreachable(_))));
    }
}
