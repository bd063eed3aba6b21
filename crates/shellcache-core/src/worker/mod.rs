//! The offline resource cache worker.
//!
//! `ShellWorker` owns one build's asset bundle and drives the cache lifecycle
//! against injected storage and network handles:
//! - install: stage the core shell in the temp store
//! - activate: reconcile the content store against the previous manifest
//! - fetch: serve GET requests for manifest resources
//! - hydrate: fetch every manifest resource not cached yet
//!
//! `WorkerHost` delivers lifecycle events to workers and tracks which one is
//! waiting and which one is active.

pub mod host;
pub mod keys;
pub mod lifecycle;
pub mod message;
pub mod serve;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;
use url::Url;

use crate::cache::CacheStorage;
use crate::manifest::{AssetBundle, Manifest};
use crate::net::{FetchError, Fetcher, Request, Response};

pub use host::{Event, EventOutcome, HostHandle, HostStatus, WorkerHost, WorkerState};
pub use lifecycle::{ActivationOutcome, ActivationReport, HydrationReport, InstallReport};
pub use message::{Command, MessageOutcome};
pub use serve::FetchOutcome;

/// Maximum concurrent fetches when staging the shell or hydrating.
/// Keeps a full hydration from opening hundreds of connections at once.
const MAX_CONCURRENT_FETCHES: usize = 8;

pub struct ShellWorker {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    bundle: Arc<AssetBundle>,
    origin: Url,
    origin_prefix: String,
    eager_takeover: bool,
    skip_waiting: AtomicBool,
}

impl ShellWorker {
    pub fn new(
        origin: Url,
        bundle: Arc<AssetBundle>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let origin_prefix = keys::origin_prefix(&origin)?;
        Ok(Self {
            storage,
            fetcher,
            bundle,
            origin,
            origin_prefix,
            eager_takeover: true,
            skip_waiting: AtomicBool::new(false),
        })
    }

    /// Whether install asks to skip the waiting period. On by default.
    pub fn with_eager_takeover(mut self, eager: bool) -> Self {
        self.eager_takeover = eager;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn bundle(&self) -> &AssetBundle {
        &self.bundle
    }

    pub fn manifest(&self) -> &Manifest {
        &self.bundle.resources
    }

    /// Request immediate activation, bypassing the waiting slot. Clients
    /// need a reload to pick up the new worker.
    pub fn skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::SeqCst) {
            info!(origin = %self.origin, "Worker will take over without waiting");
        }
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    fn resource_request(&self, key: &str, reload: bool) -> Result<Request> {
        let url = keys::resource_url(&self.origin_prefix, key)?;
        Ok(if reload { Request::reload(url) } else { Request::get(url) })
    }

    fn stored_key(&self, url: &str) -> Option<String> {
        keys::stored_key(&self.origin_prefix, url)
    }

    async fn fetch_ok(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self.fetcher.fetch(request).await?;
        if response.is_ok() {
            Ok(response)
        } else {
            Err(FetchError::from_status(response.status, &response.url, &response.body))
        }
    }

    /// Fetch every request, failing as a whole if any fetch fails or returns
    /// an error status. Responses come back in request order.
    async fn fetch_all(&self, requests: &[Request]) -> Result<Vec<Response>, FetchError> {
        // Built up front so the future stays Send inside the host's event loop
        let fetches: Vec<_> = requests.iter().map(|request| self.fetch_ok(request)).collect();
        stream::iter(fetches)
            .buffered(MAX_CONCURRENT_FETCHES)
            .try_collect()
            .await
    }
}
