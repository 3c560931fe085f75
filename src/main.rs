use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use melodeon::cache::CacheStore;
use melodeon::config::{resolve_transcoder_path, Settings};
use melodeon::create_app;
use melodeon::janitor;
use melodeon::library::{FsLibraryIndex, NullIndexer};
use melodeon::readiness::ReadinessParams;
use melodeon::registry::JobRegistry;
use melodeon::streamer::Streamer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override `cacheRoot` from the config file
    #[arg(long)]
    cache_root: Option<String>,

    /// Override `server.port` from the config file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = config::Config::builder()
        .add_source(config::File::with_name(&args.config))
        .build()?;
    let mut settings: Settings = settings.try_deserialize()?;

    if let Some(cache_root) = args.cache_root {
        settings.cache.cache_root = cache_root;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    info!(config = args.config, "configuration loaded");

    let library_root = PathBuf::from(&settings.library.root);
    let library = Arc::new(FsLibraryIndex::new(library_root.clone()));
    match library.rescan().await {
        Ok(count) => info!(count, root = %library_root.display(), "library index built"),
        Err(e) => error!(error = %e, "initial library scan failed"),
    }

    let cache = CacheStore::new(
        settings.cache.max_entries,
        Duration::from_secs(settings.cache.max_age_minutes * 60),
        settings.cache.enabled,
    );

    let transcoder_path = resolve_transcoder_path(&settings.transcoder);
    let registry = JobRegistry::new(
        settings.concurrency.max_jobs,
        transcoder_path.clone(),
        Duration::from_secs(settings.job.timeout_minutes * 60),
    );

    let cache_root = PathBuf::from(&settings.cache.cache_root);
    tokio::fs::create_dir_all(&cache_root).await?;

    info!(
        transcoder = transcoder_path,
        cache_root = %cache_root.display(),
        max_jobs = settings.concurrency.max_jobs,
        "streamer core initialized"
    );

    let streamer = Streamer::with_readiness_params(
        library,
        cache.clone(),
        registry,
        cache_root,
        ReadinessParams::from(&settings.readiness),
    );

    let shutdown = CancellationToken::new();
    let janitor_handle = janitor::spawn(cache, shutdown.clone());
    let indexer_handle = NullIndexer::spawn(shutdown.clone());

    let app = create_app(streamer);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!(addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    let _ = janitor_handle.await;
    let _ = indexer_handle.await;

    Ok(())
}
