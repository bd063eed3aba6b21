//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which records
//! the served origin, the asset manifest path, an optional cache directory
//! override and the network timeout.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::net::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub origin: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn origin_url(&self) -> Result<Url> {
        let origin = self
            .origin
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No origin configured. Pass --origin or set SHELLCACHE_ORIGIN"))?;
        Ok(Url::parse(origin)?)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    /// Cache root: the explicit override, else a per-host directory under the
    /// platform cache dir so different origins never share stores.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Ok(origin) = self.origin_url() {
            if let Some(host) = origin.host_str() {
                let dir = match origin.port() {
                    Some(port) => format!("{}_{}", host, port),
                    None => host.to_string(),
                };
                path = path.join(dir);
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_override_wins() {
        let config = Config {
            origin: Some("https://shop.example.com".to_string()),
            cache_dir: Some(PathBuf::from("/tmp/shellcache-test")),
            ..Config::default()
        };
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/shellcache-test"));
    }

    #[test]
    fn test_cache_dir_is_per_host() {
        let Some(base) = dirs::cache_dir() else {
            return;
        };
        let config = Config {
            origin: Some("http://localhost:8080/".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cache_dir().unwrap(),
            base.join(APP_NAME).join("localhost_8080")
        );
    }

    #[test]
    fn test_missing_origin_is_an_error() {
        let err = Config::default().origin_url().unwrap_err();
        assert!(err.to_string().contains("--origin"));
    }

    #[test]
    fn test_timeout_default() {
        assert_eq!(Config::default().request_timeout_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        let config = Config {
            request_timeout_secs: Some(5),
            ..Config::default()
        };
        assert_eq!(config.request_timeout_secs(), 5);
    }

    #[test]
    fn test_config_json_shape() {
        let json = r#"{"origin":"https://shop.example.com","manifest_path":"web/shellcache.json"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.origin.as_deref(), Some("https://shop.example.com"));
        assert_eq!(config.manifest_path, Some(PathBuf::from("web/shellcache.json")));
        assert_eq!(config.cache_dir, None);
    }
}
