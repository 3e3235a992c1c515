/**
 * NSQD EXPORTER - Point d'entrée du serveur
 *
 * RÔLE : bootstrap config (.env, YAML, CLI), logging tracing, état partagé, HTTP.
 * Arrêt propre sur Ctrl-C / SIGTERM.
 */

use anyhow::{Context, Result};
use clap::Parser;
use nsqd_exporter::config::{load_config, load_config_from, EvictionPolicy};
use nsqd_exporter::http::build_router;
use nsqd_exporter::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nsqd-exporter", version, about = "Prometheus exporter for nsqd stats")]
struct Args {
    /// Port d'écoute HTTP (prime sur le fichier de config)
    #[arg(
        long = "listen-port",
        visible_alias = "listenPort",
        alias = "lp",
        env = "LISTEN_PORT"
    )]
    listen_port: Option<u16>,

    /// Adresse d'écoute
    #[arg(long = "listen-host", env = "LISTEN_HOST")]
    listen_host: Option<String>,

    /// reset | precise | sweep
    #[arg(long, env = "NSQD_EXPORTER_EVICTION")]
    eviction: Option<EvictionPolicy>,

    /// Fichier YAML (sinon $NSQD_EXPORTER_CONFIG ou exporter.yaml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nsqd_exporter=info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => load_config_from(path).await,
        None => load_config().await,
    };
    if let Some(port) = args.listen_port {
        cfg.listen_port = port;
    }
    if let Some(host) = args.listen_host {
        cfg.listen_host = host;
    }
    if let Some(eviction) = args.eviction {
        cfg.eviction = eviction;
    }

    let addr: SocketAddr = format!("{}:{}", cfg.listen_host, cfg.listen_port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.listen_host, cfg.listen_port))?;
    info!(
        "[exporter] eviction={:?} stats_path={} default_timeout={}s",
        cfg.eviction, cfg.stats_path, cfg.default_timeout_secs
    );

    let app_state = AppState::new(cfg).context("failed to build exporter state")?;
    let app = build_router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[exporter] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("[exporter] stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[exporter] failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("[exporter] failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("[exporter] shutdown requested");
}
