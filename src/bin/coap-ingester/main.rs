mod args;

use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use args::Args;
use clap::Parser as _;
use indoor_telemetry::{
    cache::PredictionCache,
    db::new_pool,
    server::{Router, resolve_bind_addr, serve},
};
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

const DATABASE_FILE_NAME: &str = "data.db";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter(
            &env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default(),
        ))
        .init();

    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let database = match args.database {
        Some(path) => path,
        None => default_database_path().context("failed to locate default database")?,
    };
    info!("database location: {}", database.display());

    let pool = new_pool(&database)
        .await
        .context("failed to connect to database")?;

    let addr = resolve_bind_addr(args.bind, args.port)
        .await
        .context("failed to resolve bind address")?;

    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("failed to bind UDP socket: {addr}"))?;
    info!("CoAP server running on coap://{}", socket.local_addr()?);

    let router = Router::new(pool, Arc::new(PredictionCache::new()));
    serve(socket, router).await;

    Ok(())
}

/// `RUST_LOG` directives, falling back to `info` when none are given.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}

fn default_database_path() -> Result<PathBuf> {
    let exe = env::current_exe().context("failed to get current executable path")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("executable has no parent directory: {}", exe.display()))?;

    Ok(dir.join(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter("").to_string(), "info");
    }

    #[test]
    fn test_log_filter_honors_debug() {
        assert_eq!(log_filter("debug").to_string(), "debug");
    }
}
