use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::net::Response;

/// Staging store filled during install.
pub const TEMP_STORE: &str = "shellcache-temp";

/// Persistent content store the worker serves from.
pub const CONTENT_STORE: &str = "shellcache-content";

/// Single-entry store holding the last applied manifest.
pub const MANIFEST_STORE: &str = "shellcache-manifest";

/// Key of the manifest entry inside [`MANIFEST_STORE`].
pub const MANIFEST_KEY: &str = "manifest";

/// All stores the worker owns, in wipe order.
pub const ALL_STORES: [&str; 3] = [CONTENT_STORE, TEMP_STORE, MANIFEST_STORE];

/// A response as held by a store, stamped with the time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Named key-value stores mapping a request URL to a stored response.
///
/// Reads of a store that does not exist behave like reads of an empty store
/// and do not create it. `put` and `open` create the store on first use.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the store if it does not exist yet.
    async fn open(&self, store: &str) -> Result<()>;

    async fn has(&self, store: &str) -> Result<bool>;

    /// Drop the store and everything in it. Returns whether it existed.
    async fn delete(&self, store: &str) -> Result<bool>;

    async fn store_names(&self) -> Result<Vec<String>>;

    async fn keys(&self, store: &str) -> Result<Vec<String>>;

    async fn get(&self, store: &str, url: &str) -> Result<Option<CachedResponse>>;

    async fn put(&self, store: &str, url: &str, response: &Response) -> Result<()>;

    /// Remove one entry. Returns whether it existed.
    async fn remove(&self, store: &str, url: &str) -> Result<bool>;
}
