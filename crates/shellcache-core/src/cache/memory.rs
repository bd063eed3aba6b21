use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, CachedResponse};
use crate::net::Response;

/// Process-local stores. Used by tests and by embedders that rebuild the
/// cache on every start.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, store: &str) -> Result<()> {
        self.stores
            .write()
            .await
            .entry(store.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, store: &str) -> Result<bool> {
        Ok(self.stores.read().await.contains_key(store))
    }

    async fn delete(&self, store: &str) -> Result<bool> {
        Ok(self.stores.write().await.remove(store).is_some())
    }

    async fn store_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn keys(&self, store: &str) -> Result<Vec<String>> {
        let stores = self.stores.read().await;
        let mut keys: Vec<String> = stores
            .get(store)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, store: &str, url: &str) -> Result<Option<CachedResponse>> {
        let stores = self.stores.read().await;
        Ok(stores.get(store).and_then(|entries| entries.get(url)).cloned())
    }

    async fn put(&self, store: &str, url: &str, response: &Response) -> Result<()> {
        self.stores
            .write()
            .await
            .entry(store.to_string())
            .or_default()
            .insert(url.to_string(), CachedResponse::new(response.clone()));
        Ok(())
    }

    async fn remove(&self, store: &str, url: &str) -> Result<bool> {
        let mut stores = self.stores.write().await;
        Ok(stores
            .get_mut(store)
            .map(|entries| entries.remove(url).is_some())
            .unwrap_or(false))
    }
}
