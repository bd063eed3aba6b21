//! Network access module.
//!
//! This module provides the request/response values used throughout the
//! crate, the `Fetcher` seam the worker fetches through, and the
//! reqwest-backed `HttpFetcher`. There are no automatic retries: a failed
//! fetch is reported to the caller, and recovery is left to the next
//! lifecycle cycle.

pub mod client;
pub mod error;
pub mod request;

pub use client::{Fetcher, HttpFetcher, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::FetchError;
pub use request::{CacheMode, Request, Response};
pub use reqwest::Method;
