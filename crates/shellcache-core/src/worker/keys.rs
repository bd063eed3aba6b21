//! Mapping between absolute URLs and manifest keys.

use anyhow::{bail, Result};
use url::Url;

use crate::manifest::ROOT_KEY;

/// Versioned asset URLs carry a cache-busting `?v=` suffix that is not part
/// of the manifest key.
const VERSION_QUERY: &str = "?v=";

/// `scheme://host[:port]` with no trailing slash, or an error for origins
/// that cannot serve resources (`file:`, `data:` and friends).
pub fn origin_prefix(origin: &Url) -> Result<String> {
    if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
        bail!("Origin must be an http(s) URL with a host: {}", origin);
    }
    Ok(origin.origin().ascii_serialization())
}

/// Part of `url` after `origin/`, or `None` for URLs outside the origin.
fn relative_to<'a>(origin: &str, url: &'a str) -> Option<&'a str> {
    let rest = url.strip_prefix(origin)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Logical key of a stored entry: its path relative to the origin, with the
/// empty path mapped to the root key.
pub fn stored_key(origin: &str, url: &str) -> Option<String> {
    let key = relative_to(origin, url)?;
    Some(if key.is_empty() { ROOT_KEY } else { key }.to_string())
}

/// Logical key of an incoming request. Drops the `?v=` suffix and maps the
/// origin itself, hash routes (`origin/#...`) and the empty path to the
/// root key.
pub fn request_key(origin: &str, url: &str) -> Option<String> {
    let mut key = relative_to(origin, url)?;
    if let Some(at) = key.find(VERSION_QUERY) {
        key = &key[..at];
    }
    if key.is_empty() || key.starts_with('#') {
        return Some(ROOT_KEY.to_string());
    }
    Some(key.to_string())
}

/// Absolute URL for a manifest key.
pub fn resource_url(origin: &str, key: &str) -> Result<Url> {
    let path = if key == ROOT_KEY { "" } else { key };
    Ok(Url::parse(&format!("{}/{}", origin, path))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://shop.example.com";

    #[test]
    fn test_origin_prefix() {
        let origin = Url::parse("https://shop.example.com:443/app/").unwrap();
        assert_eq!(origin_prefix(&origin).unwrap(), ORIGIN);

        let with_port = Url::parse("http://localhost:8080").unwrap();
        assert_eq!(origin_prefix(&with_port).unwrap(), "http://localhost:8080");

        assert!(origin_prefix(&Url::parse("file:///srv/web").unwrap()).is_err());
    }

    #[test]
    fn test_stored_key() {
        assert_eq!(stored_key(ORIGIN, "https://shop.example.com/").as_deref(), Some("/"));
        assert_eq!(stored_key(ORIGIN, "https://shop.example.com").as_deref(), Some("/"));
        assert_eq!(
            stored_key(ORIGIN, "https://shop.example.com/assets/FontManifest.json").as_deref(),
            Some("assets/FontManifest.json")
        );
        // Activation compares stored keys verbatim, query and all
        assert_eq!(
            stored_key(ORIGIN, "https://shop.example.com/main.dart.js?v=2").as_deref(),
            Some("main.dart.js?v=2")
        );
        assert_eq!(stored_key(ORIGIN, "https://cdn.example.com/main.dart.js"), None);
        assert_eq!(stored_key(ORIGIN, "https://shop.example.com.evil/x"), None);
    }

    #[test]
    fn test_request_key_strips_version_query() {
        assert_eq!(
            request_key(ORIGIN, "https://shop.example.com/main.dart.js?v=123").as_deref(),
            Some("main.dart.js")
        );
        assert_eq!(
            request_key(ORIGIN, "https://shop.example.com/flutter.js?x=1").as_deref(),
            Some("flutter.js?x=1")
        );
    }

    #[test]
    fn test_request_key_root_forms() {
        for url in [
            "https://shop.example.com",
            "https://shop.example.com/",
            "https://shop.example.com/#/cart",
            "https://shop.example.com/#",
            "https://shop.example.com/?v=42",
        ] {
            assert_eq!(request_key(ORIGIN, url).as_deref(), Some(ROOT_KEY), "{}", url);
        }
    }

    #[test]
    fn test_request_key_foreign_origin() {
        assert_eq!(request_key(ORIGIN, "https://fonts.example.net/roboto.woff2"), None);
    }

    #[test]
    fn test_resource_url() {
        assert_eq!(resource_url(ORIGIN, ROOT_KEY).unwrap().as_str(), "https://shop.example.com/");
        assert_eq!(
            resource_url(ORIGIN, "assets/AssetManifest.bin.json").unwrap().as_str(),
            "https://shop.example.com/assets/AssetManifest.bin.json"
        );
    }
}
