use std::io;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use topical::{api, config, logging, processing::SummaryService};

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 4100..=4199;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;
    let service = SummaryService::new(&config.backend, config.pipeline.clone())
        .context("Failed to construct summarization backend")?;

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!(
        port,
        provider = %config.backend.provider,
        model = %config.backend.model,
        chunk_size = service.chunk_size(),
        max_concurrent_chunks = config.pipeline.max_concurrent_chunks,
        "Topical API listening on http://0.0.0.0:{port}"
    );

    let app = api::create_router(Arc::new(service));
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Bind the configured port, or the first free port in [`FALLBACK_PORTS`].
async fn bind_listener(server_port: Option<u16>) -> io::Result<(TcpListener, u16)> {
    let candidates = match server_port {
        Some(port) => port..=port,
        None => FALLBACK_PORTS,
    };
    for port in candidates {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == io::ErrorKind::AddrInUse && server_port.is_none() => {
                tracing::debug!(port, "Port already in use; trying next");
            }
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
