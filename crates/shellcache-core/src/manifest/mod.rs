//! Resource manifests and core shell lists.
//!
//! A build is described by an `AssetBundle`: the manifest mapping each
//! resource path to a content fingerprint, and the ordered list of shell
//! resources needed to boot offline. Bundles are loaded from JSON, imported
//! from a generated `flutter_service_worker.js`, or produced by scanning a
//! web build directory.

pub mod resources;
pub mod scan;

pub use resources::{AssetBundle, Manifest, ROOT_KEY};
pub use scan::{fingerprint_file, scan_build_dir, DEFAULT_CORE, INDEX_DOCUMENT};
