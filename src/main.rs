//! rserver-probe: a smoke-test client for a local HTTP proxy
//!
//! Connects to the proxy, sends one raw HTTP request, reads until the proxy
//! closes the connection and prints both the request and the reply.
//!
//! Features:
//! - Request bytes sent verbatim, no request construction
//! - Read-until-closed response accumulation
//! - Strict UTF-8 decoding of the reply
//! - Configuration via CLI arguments or TOML file

mod client;
mod config;

use client::Client;
use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout is reserved for the transcript
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        address = %config.address,
        request_bytes = config.request.len(),
        read_chunk_size = config.read_chunk_size,
        "Starting rserver-probe"
    );

    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    Client::new(&config).run(&mut output)?;

    Ok(())
}
