use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::http::{router, HttpServer};
use tollgate::ratelimit::{FixedWindowLimiter, Reaper};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Fixed window admission control for HTTP services", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(
        http_addr = %config.server.http_addr,
        env = %config.server.env,
        "Configuration loaded"
    );

    // Fails fast on a zero limit or an empty or oversized window
    let limiter = FixedWindowLimiter::from_config(config.rate_limiting.limit_config())?;
    info!(
        enabled = limiter.is_enabled(),
        requests_per_time_frame = config.rate_limiting.requests_per_time_frame,
        time_frame_secs = config.rate_limiting.time_frame_secs,
        "Rate limiter initialized"
    );

    let reaper = limiter.is_enabled().then(|| {
        Reaper::new(limiter.store().clone(), config.rate_limiting.reaper_settings()).spawn()
    });

    let app = router(&config.server.env, Arc::new(limiter));
    let server = HttpServer::bind(config.server.http_addr, app).await?;

    info!("Listening on {}", server.local_addr()?);

    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(reaper) = reaper {
        reaper.shutdown().await;
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
