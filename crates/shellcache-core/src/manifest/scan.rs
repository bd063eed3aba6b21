//! Build an asset bundle from a web build output directory.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::{AssetBundle, Manifest, ROOT_KEY};

/// Document served for the root key.
pub const INDEX_DOCUMENT: &str = "index.html";

/// Service worker scripts are never listed in their own manifest.
const SKIPPED_FILES: &[&str] = &["flutter_service_worker.js", "shellcache.json"];

/// Shell entries used when the caller gives none, filtered to what the
/// build actually contains.
pub const DEFAULT_CORE: &[&str] = &[
    "main.dart.js",
    "index.html",
    "flutter_bootstrap.js",
    "assets/AssetManifest.bin.json",
    "assets/FontManifest.json",
];

/// Bytes of the SHA-256 digest kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 16;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Fingerprint a file's contents.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(&hasher.finalize()[..FINGERPRINT_BYTES]))
}

/// Walk `build_dir` and fingerprint every file. Hidden entries are skipped,
/// `index.html` is mirrored under the root key, and the core list defaults
/// to [`DEFAULT_CORE`] when `core` is empty.
pub fn scan_build_dir(build_dir: &Path, core: &[String]) -> Result<AssetBundle> {
    let mut resources = Manifest::new();

    for entry in WalkDir::new(build_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", build_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(build_dir)?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if SKIPPED_FILES.contains(&key.as_str()) {
            continue;
        }

        let fingerprint = fingerprint_file(entry.path())?;
        debug!(key = %key, fingerprint = %fingerprint, "Fingerprinted resource");
        resources.insert(key, fingerprint);
    }

    if let Some(index) = resources.fingerprint(INDEX_DOCUMENT).map(str::to_string) {
        resources.insert(ROOT_KEY, index);
    }

    let core = if core.is_empty() {
        DEFAULT_CORE
            .iter()
            .filter(|path| resources.contains(path))
            .map(|path| path.to_string())
            .collect()
    } else {
        core.to_vec()
    };

    Ok(AssetBundle::new(resources, core))
}
