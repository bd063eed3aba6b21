//! Offline resource cache for web application shells.
//!
//! A build ships a manifest of every static resource and its content
//! fingerprint, plus a short list of shell resources needed to boot. The
//! worker stages the shell on install, reconciles the persistent cache
//! against the previous build's manifest on activate so unchanged resources
//! are never downloaded twice, and then serves requests: the document root
//! online-first, every other listed resource cache-first.
//!
//! Storage and network are injected through the [`cache::CacheStorage`] and
//! [`net::Fetcher`] traits.

pub mod cache;
pub mod config;
pub mod manifest;
pub mod net;
pub mod utils;
pub mod worker;

pub use cache::{CacheStorage, DiskStorage, MemoryStorage};
pub use config::Config;
pub use manifest::{AssetBundle, Manifest, ROOT_KEY};
pub use net::{FetchError, Fetcher, HttpFetcher, Request, Response};
pub use worker::{FetchOutcome, ShellWorker, WorkerHost};
