//! CLI argument definitions using clap derive

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// shellcache - offline cache for web application shells
///
/// Stages, reconciles and serves a build's static resources from a local
/// cache so the app keeps working without a network.
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Origin serving the application, e.g. https://shop.example.com
    #[arg(long, global = true, env = "SHELLCACHE_ORIGIN")]
    pub origin: Option<String>,

    /// Asset manifest JSON (resources + core shell list)
    #[arg(short, long, global = true, env = "SHELLCACHE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Cache directory override
    #[arg(long, global = true, env = "SHELLCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Network timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fingerprint a web build directory into an asset manifest
    Manifest(ManifestArgs),

    /// Convert a generated flutter_service_worker.js into an asset manifest
    Import(ImportArgs),

    /// Stage the core shell in the temporary store
    Install,

    /// Reconcile the content store against the previous manifest
    Activate,

    /// Install and activate in one step
    Update,

    /// Serve one request through the worker
    Get(GetArgs),

    /// Download every manifest resource not cached yet
    Hydrate,

    /// Post a raw message (skipWaiting, downloadOffline) to the worker
    Message(MessageArgs),

    /// Show cache stores and their contents
    Status(StatusArgs),

    /// Delete every cache store
    Clear,

    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ManifestArgs {
    /// Web build output directory
    pub build_dir: PathBuf,

    /// Where to write the manifest (default: <build_dir>/shellcache.json)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Core shell entries, in fetch order (default: Flutter shell files present)
    #[arg(long = "core", value_name = "PATH")]
    pub core: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Path to flutter_service_worker.js
    pub script: PathBuf,

    /// Where to write the manifest
    #[arg(short, long, default_value = "shellcache.json")]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Absolute URL, or a path relative to the origin
    pub target: String,

    /// HTTP method; anything but GET passes through
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Write the body here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct MessageArgs {
    /// Message payload
    pub data: String,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// List every entry
    #[arg(long)]
    pub entries: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Persist the effective configuration
    #[arg(long)]
    pub save: bool,
}
