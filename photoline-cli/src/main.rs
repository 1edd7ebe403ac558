use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use photoline_config::{ConfigSource, PhotolineConfig};
use photoline_core::catalog::{CatalogSnapshot, InMemoryCatalog};
use photoline_core::metadata::ExifMetadataExtractor;
use photoline_core::pool::LazyPreviewPool;
use photoline_core::preview::{PreviewExecutor, PreviewResultSink};
use photoline_core::scan::{
    PhotoScanJob, RealFs, ScanJobState, ScanService, ScanStatus, ScanStatusTracker,
};
use photoline_core::types::{ScanUser, UserId};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "photoline")]
#[command(about = "Reconcile a photo library with its catalog and render previews")]
struct Cli {
    /// Configuration file (TOML or JSON). Overrides PHOTOLINE_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog snapshot, created on first use.
    #[arg(long, global = true, default_value = "photoline-catalog.json")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a library directory and update the catalog
    Scan(ScanArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct ScanArgs {
    /// Library root to walk
    #[arg(long)]
    base: PathBuf,

    /// Directory receiving previews
    #[arg(long)]
    cache: PathBuf,

    /// Re-hash every known file instead of only reconciling additions and
    /// removals
    #[arg(long)]
    full: bool,

    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, source) = match &cli.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let config = PhotolineConfig::load_from_file(path)?;
            config.validate()?;
            (config, ConfigSource::File(path.clone()))
        }
        None => PhotolineConfig::load_from_env()?,
    };

    let default_filter = config.logging.filter.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &source {
        ConfigSource::Default => info!("using default configuration"),
        ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "configuration loaded from file")
        }
        ConfigSource::EnvInline => info!("configuration loaded from inline environment json"),
    }

    match cli.command {
        Command::Scan(args) => run_scan(&config, &cli.catalog, args).await,
    }
}

async fn run_scan(
    config: &PhotolineConfig,
    catalog_path: &Path,
    args: ScanArgs,
) -> anyhow::Result<()> {
    let base = tokio::fs::canonicalize(&args.base)
        .await
        .with_context(|| format!("library root {} is not accessible", args.base.display()))?;
    tokio::fs::create_dir_all(&args.cache)
        .await
        .with_context(|| format!("failed to create cache dir {}", args.cache.display()))?;
    let cache = tokio::fs::canonicalize(&args.cache).await?;

    let catalog = Arc::new(load_catalog(catalog_path).await?);
    let user_id = register_user(&catalog, base, cache).await;

    let sink: Arc<dyn PreviewResultSink> = catalog.clone();
    let previews = Arc::new(
        LazyPreviewPool::new(
            config.worker_pool,
            PreviewExecutor::new(Arc::new(config.preview.codec())),
            sink,
        )
        .with_idle_timeout(config.scanner.idle_timeout()),
    );
    let job = PhotoScanJob::new(
        catalog.clone(),
        Arc::new(RealFs::new()),
        Arc::new(ExifMetadataExtractor::new()),
        Arc::new(ScanStatusTracker::new()),
        previews,
    );
    let service = ScanService::new(Arc::new(job))
        .with_status_retention(config.scanner.status_retention());

    let job_id = if args.full {
        service.start_scan(user_id)?
    } else {
        service.start_delta_scan(user_id)?
    };

    let poll = Duration::from_millis(args.poll_ms.max(10));
    let status = tokio::select! {
        status = wait_for_terminal(&service, user_id, poll) => status?,
        _ = tokio::signal::ctrl_c() => {
            warn!(job_id = %job_id, "interrupted; stopping preview workers");
            service.shutdown().await;
            bail!("scan interrupted");
        }
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    save_catalog(catalog_path, &catalog).await?;
    service.shutdown().await;

    if status.status == ScanJobState::Error {
        bail!("scan job {job_id} failed; see the log for details");
    }
    Ok(())
}

async fn wait_for_terminal(
    service: &ScanService,
    user_id: UserId,
    poll: Duration,
) -> anyhow::Result<ScanStatus> {
    loop {
        let Some(status) = service.get_status(user_id) else {
            bail!("scan status for user {user_id} disappeared");
        };
        if status.status.is_terminal() {
            return Ok(status);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Reuses the catalog owner of `base` when there is one.
async fn register_user(catalog: &InMemoryCatalog, base: PathBuf, cache: PathBuf) -> UserId {
    let snapshot = catalog.snapshot().await;
    let id = snapshot
        .users
        .iter()
        .find(|user| user.base_path.as_deref() == Some(base.as_path()))
        .map(|user| user.id)
        .unwrap_or_default();

    info!(user_id = %id, base = %base.display(), "library owner");
    catalog
        .add_user(ScanUser {
            id,
            base_path: Some(base),
            cache_path: Some(cache),
        })
        .await;
    id
}

async fn load_catalog(path: &Path) -> anyhow::Result<InMemoryCatalog> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "starting a new catalog");
        return Ok(InMemoryCatalog::new());
    }
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let snapshot: CatalogSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("catalog {} is not valid JSON", path.display()))?;
    info!(
        path = %path.display(),
        photos = snapshot.photos.len(),
        files = snapshot.files.len(),
        "catalog loaded"
    );
    Ok(InMemoryCatalog::from_snapshot(snapshot))
}

/// Writes through a temp file so an interrupted save never truncates the
/// previous catalog.
async fn save_catalog(path: &Path, catalog: &InMemoryCatalog) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(&catalog.snapshot().await)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move catalog into place at {}", path.display()))?;
    info!(path = %path.display(), bytes = json.len(), "catalog saved");
    Ok(())
}
