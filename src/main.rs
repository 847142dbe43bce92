//! ota-serve: a single-file transfer responder
//!
//! Any bytes received on a connection trigger a response frame:
//! - 4-byte little-endian size
//! - 20-byte SHA-1 digest of the content
//! - the content of the configured file
//!
//! Features:
//! - One task per connection, file re-read on every trigger
//! - Size field from the bytes read or from file metadata
//! - Fetch mode that downloads and verifies one frame
//! - Configuration via CLI arguments or TOML file

mod client;
mod config;
mod frame;
mod responder;
mod server;

use config::{Config, FetchConfig};
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    match config.fetch.clone() {
        Some(fetch) => runtime.block_on(run_fetch(fetch)),
        None => runtime.block_on(run_server(config)),
    }
}

/// Serve the configured file until the process is killed
async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        file = %config.file.display(),
        size_from = ?config.size_from,
        workers = ?config.workers,
        "Starting ota-serve"
    );

    Server::new(config).run().await?;
    Ok(())
}

/// Fetch one frame, verify it and write its content to disk
async fn run_fetch(fetch: FetchConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(addr = %fetch.addr, output = %fetch.output.display(), "Fetching");

    let frame = client::fetch(&fetch.addr, &fetch.trigger, fetch.timeout).await?;
    tokio::fs::write(&fetch.output, frame.content()).await?;

    info!(
        size = frame.size(),
        digest = %frame.digest_hex(),
        output = %fetch.output.display(),
        "Checksum pass"
    );
    Ok(())
}
