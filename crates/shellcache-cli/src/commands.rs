//! Subcommand implementations

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};
use url::Url;

use shellcache_core::cache::{CachedResponse, ALL_STORES, MANIFEST_KEY, MANIFEST_STORE};
use shellcache_core::manifest::scan_build_dir;
use shellcache_core::net::Method;
use shellcache_core::utils::{format_bytes, truncate_string};
use shellcache_core::worker::{ActivationReport, Command, MessageOutcome, WorkerState};
use shellcache_core::{
    AssetBundle, CacheStorage, Config, DiskStorage, FetchOutcome, Fetcher, HttpFetcher, Manifest,
    Request, ShellWorker, WorkerHost,
};

use crate::cli::{Cli, Commands, ConfigArgs, GetArgs, ImportArgs, ManifestArgs, StatusArgs};

/// Default manifest file name written next to a scanned build.
const MANIFEST_FILE: &str = "shellcache.json";

/// Width of the URL column in `status --entries`.
const URL_COLUMN_WIDTH: usize = 72;

pub async fn run(cli: Cli) -> Result<()> {
    let config = effective_config(&cli)?;

    match cli.command {
        Commands::Manifest(args) => manifest(args),
        Commands::Import(args) => import(args),
        Commands::Install => install(&config).await,
        Commands::Activate => activate(&config).await,
        Commands::Update => update(&config).await,
        Commands::Get(args) => get(&config, args).await,
        Commands::Hydrate => hydrate(&config).await,
        Commands::Message(args) => message(&config, &args.data).await,
        Commands::Status(args) => status(&config, args).await,
        Commands::Clear => clear(&config).await,
        Commands::Config(args) => show_config(&config, args),
    }
}

/// Saved configuration with command-line flags layered on top.
fn effective_config(cli: &Cli) -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    Ok(apply_flags(config, cli))
}

fn apply_flags(mut config: Config, cli: &Cli) -> Config {
    if let Some(ref origin) = cli.origin {
        config.origin = Some(origin.clone());
    }
    if let Some(ref manifest) = cli.manifest {
        config.manifest_path = Some(manifest.clone());
    }
    if let Some(ref dir) = cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = Some(timeout);
    }
    config
}

fn open_storage(config: &Config) -> Result<Arc<DiskStorage>> {
    let root = config.cache_dir()?;
    debug!(root = %root.display(), "Opening cache");
    Ok(Arc::new(DiskStorage::new(root)?))
}

fn open_fetcher(config: &Config) -> Result<Arc<HttpFetcher>> {
    let timeout = Duration::from_secs(config.request_timeout_secs());
    Ok(Arc::new(HttpFetcher::with_timeout(timeout)?))
}

fn load_bundle(config: &Config) -> Result<AssetBundle> {
    let path = config
        .manifest_path
        .as_deref()
        .ok_or_else(|| anyhow!("No asset manifest configured. Pass --manifest or set SHELLCACHE_MANIFEST"))?;
    AssetBundle::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

fn build_worker(config: &Config, fetcher: Arc<HttpFetcher>) -> Result<Arc<ShellWorker>> {
    let origin = config.origin_url()?;
    let bundle = load_bundle(config)?;
    info!(
        origin = %origin,
        resources = bundle.resources.len(),
        core = bundle.core.len(),
        "Loaded asset manifest"
    );
    let worker = ShellWorker::new(origin, Arc::new(bundle), open_storage(config)?, fetcher)?;
    Ok(Arc::new(worker))
}

fn manifest(args: ManifestArgs) -> Result<()> {
    let bundle = scan_build_dir(&args.build_dir, &args.core)?;
    let out = args.out.unwrap_or_else(|| args.build_dir.join(MANIFEST_FILE));
    bundle.save(&out)?;

    println!(
        "Wrote {} ({} resources, {} core)",
        out.display(),
        bundle.resources.len(),
        bundle.core.len()
    );
    Ok(())
}

fn import(args: ImportArgs) -> Result<()> {
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read {}", args.script.display()))?;
    let bundle = AssetBundle::from_service_worker_script(&script)?;
    bundle.save(&args.out)?;

    println!(
        "Wrote {} ({} resources, {} core)",
        args.out.display(),
        bundle.resources.len(),
        bundle.core.len()
    );
    Ok(())
}

async fn install(config: &Config) -> Result<()> {
    let worker = build_worker(config, open_fetcher(config)?)?;
    let report = worker.install().await?;
    println!("Staged {} shell resources", report.staged);
    Ok(())
}

async fn activate(config: &Config) -> Result<()> {
    let worker = build_worker(config, open_fetcher(config)?)?;
    let report = worker.activate().await;
    print_activation(&report);
    Ok(())
}

async fn update(config: &Config) -> Result<()> {
    let worker = build_worker(config, open_fetcher(config)?)?;
    let host = WorkerHost::new();
    let state = host.register(worker).await?;

    match state {
        WorkerState::Activated => println!("Worker installed and activated"),
        other => println!("Worker is {:?}", other),
    }
    let status = host.status().await;
    if status.clients_claimed {
        println!("Clients claimed; open pages now use this version");
    }
    Ok(())
}

fn print_activation(report: &ActivationReport) {
    println!(
        "Activation: {:?} (retained {}, evicted {}, promoted {})",
        report.outcome, report.retained, report.evicted, report.promoted
    );
}

/// Resolve a `get` target: absolute URLs pass as-is, anything else is joined
/// onto the origin.
fn resolve_target(origin: &Url, target: &str) -> Result<Url> {
    match Url::parse(target) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(origin.join(target)?),
        Err(e) => Err(e.into()),
    }
}

async fn get(config: &Config, args: GetArgs) -> Result<()> {
    let fetcher = open_fetcher(config)?;
    let worker = build_worker(config, fetcher.clone())?;

    let url = resolve_target(worker.origin(), &args.target)?;
    let method = parse_method(&args.method)?;
    let request = Request::get(url).with_method(method);

    let outcome = worker.handle_fetch(&request).await?;
    eprintln!("source: {}", outcome.source());
    let response = match outcome {
        // Not intercepted: default network handling
        FetchOutcome::Passthrough => fetcher.fetch(&request).await?,
        FetchOutcome::Cache(response) | FetchOutcome::Network(response) => response,
    };
    eprintln!("status: {}", response.status);
    if let Some(content_type) = response.content_type() {
        eprintln!("content-type: {}", content_type);
    }

    write_body(args.output.as_deref(), &response.body)
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("Invalid HTTP method: {}", method))
}

fn write_body(output: Option<&Path>, body: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("wrote {} to {}", format_bytes(body.len() as u64), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn hydrate(config: &Config) -> Result<()> {
    let worker = build_worker(config, open_fetcher(config)?)?;
    let report = worker.download_offline().await?;
    println!(
        "Fetched {} resources ({} already cached)",
        report.fetched, report.already_cached
    );
    Ok(())
}

async fn message(config: &Config, data: &str) -> Result<()> {
    let worker = build_worker(config, open_fetcher(config)?)?;
    deliver_message(&worker, data).await
}

/// Each run builds a fresh worker, so the waiting worker is the shell an
/// earlier `install` left staged. `skipWaiting` activates it now.
async fn deliver_message(worker: &ShellWorker, data: &str) -> Result<()> {
    if Command::parse(data) == Some(Command::SkipWaiting) && !worker.has_staged_shell().await? {
        bail!("No installed shell is waiting to activate. Run `install` first; `update` always takes over");
    }

    match worker.handle_message(data).await? {
        MessageOutcome::Ignored => println!("Message ignored: {}", data),
        MessageOutcome::SkipWaiting => print_activation(&worker.activate().await),
        MessageOutcome::Hydrated(report) => println!(
            "Fetched {} resources ({} already cached)",
            report.fetched, report.already_cached
        ),
    }
    Ok(())
}

async fn status(config: &Config, args: StatusArgs) -> Result<()> {
    let storage = open_storage(config)?;
    println!("Cache: {}", storage.root().display());

    let names = storage.store_names().await?;
    if names.is_empty() {
        println!("No stores");
        return Ok(());
    }

    for name in &names {
        let mut entries: Vec<(String, CachedResponse)> = Vec::new();
        for key in storage.keys(name).await? {
            if let Some(cached) = storage.get(name, &key).await? {
                entries.push((key, cached));
            }
        }
        let total: u64 = entries.iter().map(|(_, c)| c.response.body.len() as u64).sum();
        let newest = entries.iter().min_by_key(|(_, c)| c.age_minutes());
        match newest {
            Some((_, cached)) => println!(
                "{:<24} {:>5} entries {:>10}  updated {}",
                name,
                entries.len(),
                format_bytes(total),
                cached.age_display()
            ),
            None => println!("{:<24} {:>5} entries", name, 0),
        }

        if args.entries {
            for (key, cached) in &entries {
                println!(
                    "  {:<width$} {:>4} {:>10}",
                    truncate_string(key, URL_COLUMN_WIDTH),
                    cached.response.status,
                    format_bytes(cached.response.body.len() as u64),
                    width = URL_COLUMN_WIDTH
                );
            }
        }
    }

    if let Some(previous) = stored_manifest(storage.as_ref()).await? {
        println!("Active manifest: {} resources", previous.len());
    }
    Ok(())
}

async fn stored_manifest(storage: &dyn CacheStorage) -> Result<Option<Manifest>> {
    match storage.get(MANIFEST_STORE, MANIFEST_KEY).await? {
        Some(cached) => Ok(Some(Manifest::from_json(&cached.response.body)?)),
        None => Ok(None),
    }
}

async fn clear(config: &Config) -> Result<()> {
    let storage = open_storage(config)?;
    let mut deleted = 0;
    for store in ALL_STORES {
        if storage.delete(store).await? {
            deleted += 1;
        }
    }
    println!("Deleted {} stores", deleted);
    Ok(())
}

fn show_config(config: &Config, args: ConfigArgs) -> Result<()> {
    if args.save {
        config.save()?;
        println!("Saved {}", Config::config_path()?.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    match config.cache_dir() {
        Ok(dir) => println!("Cache directory: {}", dir.display()),
        Err(e) => println!("Cache directory: unavailable ({})", e),
    }
    Ok(())
}
