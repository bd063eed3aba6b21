use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheStorage, CachedResponse};
use crate::net::Response;

/// Index file inside each store directory
const INDEX_FILE: &str = "index.json";

/// Directory holding response bodies inside each store directory
const BODIES_DIR: &str = "bodies";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    cached_at: DateTime<Utc>,
    body_file: String,
}

type Index = BTreeMap<String, IndexEntry>;

/// Stores persisted under a root directory, one subdirectory per store.
///
/// Each store keeps a JSON index of URL to response metadata, with bodies in
/// separate files named by the SHA-256 of the URL. Index and body writes go
/// through a temp file and a rename so readers never see a half-written file.
pub struct DiskStorage {
    root: PathBuf,
    // Serializes index read-modify-write within this process
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, store: &str) -> Result<PathBuf> {
        let valid = !store.is_empty()
            && store
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("Invalid store name: {:?}", store);
        }
        Ok(self.root.join(store))
    }

    fn body_file(url: &str) -> String {
        format!("{}.bin", hex::encode(Sha256::digest(url.as_bytes())))
    }

    async fn load_index(dir: &Path) -> Result<Option<Index>> {
        let path = dir.join(INDEX_FILE);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(if tokio::fs::try_exists(dir).await? {
                    Some(Index::new())
                } else {
                    None
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store index: {}", path.display()))
            }
        };

        let index = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse store index: {}", path.display()))?;
        Ok(Some(index))
    }

    async fn save_index(dir: &Path, index: &Index) -> Result<()> {
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        let contents = serde_json::to_vec_pretty(index)?;
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to write store index: {}", path.display()))?;
        Ok(())
    }

    /// Replace a body file in one step. Readers holding the old file keep
    /// reading it whole; new readers see the complete new body.
    async fn write_body(bodies: &Path, body_file: &str, body: &[u8]) -> Result<()> {
        let tmp = bodies.join(format!("{}.tmp", body_file));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, bodies.join(body_file)).await?;
        Ok(())
    }

    async fn create_store(dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir.join(BODIES_DIR))
            .await
            .with_context(|| format!("Failed to create store: {}", dir.display()))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, store: &str) -> Result<()> {
        let dir = self.store_dir(store)?;
        let _guard = self.write_lock.lock().await;
        Self::create_store(&dir).await
    }

    async fn has(&self, store: &str) -> Result<bool> {
        let dir = self.store_dir(store)?;
        Ok(tokio::fs::try_exists(&dir).await?)
    }

    async fn delete(&self, store: &str) -> Result<bool> {
        let dir = self.store_dir(store)?;
        let _guard = self.write_lock.lock().await;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to delete store: {}", dir.display()))?;
        debug!(store, "Deleted store");
        Ok(true)
    }

    async fn store_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn keys(&self, store: &str) -> Result<Vec<String>> {
        let dir = self.store_dir(store)?;
        Ok(Self::load_index(&dir)
            .await?
            .map(|index| index.into_keys().collect())
            .unwrap_or_default())
    }

    async fn get(&self, store: &str, url: &str) -> Result<Option<CachedResponse>> {
        let dir = self.store_dir(store)?;
        let Some(entry) = Self::load_index(&dir).await?.and_then(|mut index| index.remove(url)) else {
            return Ok(None);
        };

        let body_path = dir.join(BODIES_DIR).join(&entry.body_file);
        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(store, url, "Indexed entry has no body on disk, treating as missing");
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read cached body for {}", url)),
        };

        Ok(Some(CachedResponse {
            response: Response {
                url: url.to_string(),
                status: entry.status,
                headers: entry.headers,
                body,
            },
            cached_at: entry.cached_at,
        }))
    }

    async fn put(&self, store: &str, url: &str, response: &Response) -> Result<()> {
        let dir = self.store_dir(store)?;
        let _guard = self.write_lock.lock().await;
        Self::create_store(&dir).await?;

        let body_file = Self::body_file(url);
        Self::write_body(&dir.join(BODIES_DIR), &body_file, &response.body)
            .await
            .with_context(|| format!("Failed to write cached body for {}", url))?;

        let mut index = Self::load_index(&dir).await?.unwrap_or_default();
        index.insert(
            url.to_string(),
            IndexEntry {
                status: response.status,
                headers: response.headers.clone(),
                cached_at: Utc::now(),
                body_file,
            },
        );
        Self::save_index(&dir, &index).await
    }

    async fn remove(&self, store: &str, url: &str) -> Result<bool> {
        let dir = self.store_dir(store)?;
        let _guard = self.write_lock.lock().await;
        let Some(mut index) = Self::load_index(&dir).await? else {
            return Ok(false);
        };
        let Some(entry) = index.remove(url) else {
            return Ok(false);
        };

        Self::save_index(&dir, &index).await?;
        if let Err(e) = tokio::fs::remove_file(dir.join(BODIES_DIR).join(&entry.body_file)).await {
            debug!(store, url, error = %e, "Failed to remove cached body");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str, body: &str) -> Response {
        let mut response = Response::new(url, 200, body.as_bytes().to_vec());
        response
            .headers
            .insert("content-type".to_string(), "text/javascript".to_string());
        response
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://shop.example.com/main.dart.js";

        {
            let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
            storage.put("content", url, &response(url, "void main(){}")).await.unwrap();
        }

        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let cached = storage.get("content", url).await.unwrap().unwrap();
        assert_eq!(cached.response.body, b"void main(){}");
        assert_eq!(cached.response.status, 200);
        assert_eq!(cached.response.content_type(), Some("text/javascript"));
        assert_eq!(storage.keys("content").await.unwrap(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_missing_store_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();

        assert!(!storage.has("content").await.unwrap());
        assert!(storage.keys("content").await.unwrap().is_empty());
        assert!(storage.get("content", "https://x/").await.unwrap().is_none());
        assert!(!storage.has("content").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_delete_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();

        storage.open("temp").await.unwrap();
        storage.put("content", "https://x/a", &response("https://x/a", "a")).await.unwrap();
        assert_eq!(storage.store_names().await.unwrap(), vec!["content", "temp"]);
        assert!(storage.keys("temp").await.unwrap().is_empty());

        assert!(storage.delete("content").await.unwrap());
        assert!(!storage.delete("content").await.unwrap());
        assert_eq!(storage.store_names().await.unwrap(), vec!["temp"]);
    }

    #[tokio::test]
    async fn test_remove_drops_entry_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let url = "https://x/a";
        storage.put("content", url, &response(url, "a")).await.unwrap();

        assert!(storage.remove("content", url).await.unwrap());
        assert!(!storage.remove("content", url).await.unwrap());
        assert!(storage.get("content", url).await.unwrap().is_none());

        let body = dir
            .path()
            .join("content")
            .join(BODIES_DIR)
            .join(DiskStorage::body_file(url));
        assert!(!body.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overwrite_never_serves_partial_body() {
        use std::sync::Arc;

        const BODY_LEN: usize = 1 << 20;
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(DiskStorage::new(dir.path().to_path_buf()).unwrap());
        let url = "https://shop.example.com/";
        let first = vec![b'a'; BODY_LEN];
        let second = vec![b'b'; BODY_LEN];
        storage.put("content", url, &Response::new(url, 200, first.clone())).await.unwrap();

        let writer = {
            let storage = storage.clone();
            let (first, second) = (first.clone(), second.clone());
            tokio::spawn(async move {
                for i in 0..40 {
                    let body = if i % 2 == 0 { second.clone() } else { first.clone() };
                    storage.put("content", url, &Response::new(url, 200, body)).await.unwrap();
                }
            })
        };

        let mut reads = 0;
        loop {
            let cached = storage.get("content", url).await.unwrap().unwrap();
            assert!(
                cached.response.body == first || cached.response.body == second,
                "read a body of {} bytes mixing both versions",
                cached.response.body.len()
            );
            reads += 1;
            if writer.is_finished() {
                break;
            }
        }
        writer.await.unwrap();
        assert!(reads > 0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_store_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.open("../escape").await.is_err());
        assert!(storage.open("").await.is_err());
    }
}
