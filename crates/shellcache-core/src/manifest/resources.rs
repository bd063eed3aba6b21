use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Logical key of the application's document root.
pub const ROOT_KEY: &str = "/";

/// Mapping from relative resource path to content fingerprint for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, String>);

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, fingerprint: impl Into<String>) {
        self.0.insert(key.into(), fingerprint.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `key` is in this manifest with the same fingerprint it had
    /// in `previous`, meaning a cached copy can be reused.
    pub fn unchanged_since(&self, previous: &Manifest, key: &str) -> bool {
        match (self.fingerprint(key), previous.fingerprint(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse manifest")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Everything one build hands to the worker: the manifest plus the ordered
/// core shell list fetched at install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundle {
    pub resources: Manifest,
    #[serde(default)]
    pub core: Vec<String>,
}

impl AssetBundle {
    pub fn new(resources: Manifest, core: Vec<String>) -> Self {
        let bundle = Self { resources, core };
        for path in bundle.core.iter().filter(|p| !bundle.resources.contains(p)) {
            warn!(path = %path, "Core shell entry is not listed in the manifest");
        }
        bundle
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read asset manifest: {}", path.display()))?;
        let bundle: AssetBundle = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse asset manifest: {}", path.display()))?;
        Ok(Self::new(bundle.resources, bundle.core))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write asset manifest: {}", path.display()))?;
        Ok(())
    }

    /// Pull the `RESOURCES` object and `CORE` array out of a generated Flutter
    /// `flutter_service_worker.js`. Both literals are valid JSON.
    pub fn from_service_worker_script(script: &str) -> Result<Self> {
        let resources = extract_literal(script, "RESOURCES", '{', '}')?;
        let core = extract_literal(script, "CORE", '[', ']')?;

        let resources: Manifest =
            serde_json::from_str(resources).context("Failed to parse RESOURCES literal")?;
        let core: Vec<String> =
            serde_json::from_str(core).context("Failed to parse CORE literal")?;
        Ok(Self::new(resources, core))
    }
}

/// Slice out the literal assigned to `const <name> =`, from `open` to the
/// matching `close`. Brackets inside string literals are skipped.
fn extract_literal<'a>(script: &'a str, name: &str, open: char, close: char) -> Result<&'a str> {
    let marker = format!("const {} =", name);
    let after = script
        .find(&marker)
        .map(|at| at + marker.len())
        .ok_or_else(|| anyhow!("No `{}` declaration found in service worker script", name))?;
    let start = script[after..]
        .find(open)
        .map(|at| after + at)
        .ok_or_else(|| anyhow!("`{}` is not followed by '{}'", name, open))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in script[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&script[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    Err(anyhow!("Unterminated `{}` literal in service worker script", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"'use strict';
const MANIFEST = 'flutter-app-manifest';
const TEMP = 'flutter-temp-cache';
const CACHE_NAME = 'flutter-app-cache';

const RESOURCES = {"assets/AssetManifest.bin.json": "a679b6a2cf195b0916962c95a20eab26",
"assets/odd{name}.txt": "11111111111111111111111111111111",
"index.html": "81036c095c7303500ae3f8d5f2076340",
"/": "81036c095c7303500ae3f8d5f2076340",
"main.dart.js": "dab9a6229d31a0278fa180a3e9bd8c5e"};
// The application shell files that are downloaded before a service worker can
// start.
const CORE = ["main.dart.js",
"index.html",
"assets/AssetManifest.bin.json"];
self.addEventListener("install", (event) => {});
"#;

    #[test]
    fn test_from_service_worker_script() {
        let bundle = AssetBundle::from_service_worker_script(SCRIPT).unwrap();
        assert_eq!(bundle.resources.len(), 5);
        assert_eq!(
            bundle.resources.fingerprint(ROOT_KEY),
            Some("81036c095c7303500ae3f8d5f2076340")
        );
        assert!(bundle.resources.contains("assets/odd{name}.txt"));
        assert_eq!(
            bundle.core,
            vec!["main.dart.js", "index.html", "assets/AssetManifest.bin.json"]
        );
    }

    #[test]
    fn test_from_service_worker_script_missing_core() {
        let script = r#"const RESOURCES = {"/": "abc"};"#;
        let err = AssetBundle::from_service_worker_script(script).unwrap_err();
        assert!(err.to_string().contains("CORE"));
    }

    #[test]
    fn test_unchanged_since() {
        let old: Manifest = [("a.js", "1"), ("b.js", "2"), ("gone.js", "3")].into_iter().collect();
        let new: Manifest = [("a.js", "1"), ("b.js", "9"), ("fresh.js", "4")].into_iter().collect();

        assert!(new.unchanged_since(&old, "a.js"));
        assert!(!new.unchanged_since(&old, "b.js"));
        assert!(!new.unchanged_since(&old, "gone.js"));
        assert!(!new.unchanged_since(&old, "fresh.js"));
    }

    #[test]
    fn test_bundle_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("assets.json");
        let bundle = AssetBundle::new(
            [("index.html", "x"), (ROOT_KEY, "x")].into_iter().collect(),
            vec!["index.html".to_string()],
        );
        bundle.save(&path).unwrap();
        assert_eq!(AssetBundle::load(&path).unwrap(), bundle);
    }

    #[test]
    fn test_manifest_json_is_a_flat_object() {
        let manifest: Manifest = [(ROOT_KEY, "abc")].into_iter().collect();
        assert_eq!(manifest.to_json().unwrap(), br#"{"/":"abc"}"#.to_vec());
        assert_eq!(Manifest::from_json(br#"{"/":"abc"}"#).unwrap(), manifest);
        assert!(Manifest::from_json(b"not json").is_err());
    }
}
