#![forbid(unsafe_code)]

//! HTTP entry point: resolves settings, checks privileges, and serves the API
//! until Ctrl+C, then cancels any download still running.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vidgrab::{
    api::{AppState, cors_layer, router},
    config::{RuntimeOverrides, resolve_runtime_settings},
    downloads::DownloadManager,
    extractor::Extractor,
    files::DownloadFiles,
    security::ensure_not_root,
};

const DEFAULT_LOG_FILTER: &str = "vidgrab=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "vidgrab", version, about = "REST backend for yt-dlp downloads")]
struct ServerArgs {
    /// Directory finished files are written to and served from.
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
    /// Extractor executable (yt-dlp or a compatible fork).
    #[arg(long, value_name = "PATH")]
    extractor: Option<PathBuf>,
    /// Upper bound for a metadata lookup, in seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Settings file read before the defaults apply.
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

impl From<ServerArgs> for RuntimeOverrides {
    fn from(args: ServerArgs) -> Self {
        Self {
            download_dir: args.download_dir,
            extractor_command: args.extractor,
            extractor_timeout_secs: args.timeout_secs,
            host: args.host,
            port: args.port,
            env_path: args.env_file,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing();
    ensure_not_root("vidgrab")?;

    let settings = resolve_runtime_settings(args.into())?;
    tokio::fs::create_dir_all(&settings.download_dir)
        .await
        .with_context(|| format!("creating {}", settings.download_dir.display()))?;

    let extractor = Extractor::new(&settings.extractor_command, settings.extractor_timeout);
    let downloads = DownloadManager::new(extractor, &settings.download_dir);
    let state = AppState {
        downloads: downloads.clone(),
        files: DownloadFiles::new(&settings.download_dir),
        delete_delay: settings.delete_delay,
    };
    let app = router(state).layer(cors_layer(&settings.allowed_origins));

    let host = settings
        .host
        .parse()
        .with_context(|| format!("invalid listen host {:?}", settings.host))?;
    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        "listening on http://{addr} (downloads in {}, extractor {})",
        settings.download_dir.display(),
        settings.extractor_command.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    downloads.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
}
