//! urlfs FUSE mount daemon

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use urlfs_fuse::cli::Cli;
use urlfs_fuse::config::{LogFormat, UrlfsConfig};
use urlfs_fuse::network::BackendSet;
use urlfs_fuse::server::UrlfsServer;

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => UrlfsConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => UrlfsConfig::default(),
    };
    init_tracing(config.logging.format);

    tracing::info!("urlfs daemon starting...");
    tracing::info!("Mount point: {}", cli.mountpoint.display());

    // Backends block on this runtime from FUSE threads, never from its workers.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("urlfs-worker")
        .build()
        .context("building tokio runtime")?;

    let backends = BackendSet::standard(&config.network, runtime.handle().clone())?;
    tracing::info!("Backends: {}", backends.schemes().join(", "));

    let server = UrlfsServer::new(config, Arc::new(backends), runtime.handle().clone())?;
    server.preload_links();
    server.run(&cli.mountpoint, cli.options.as_deref())?;

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("urlfs daemon stopped");
    Ok(())
}
