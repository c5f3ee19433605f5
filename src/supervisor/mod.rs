//! Service lifecycle
//!
//! Wires config, preflight checks, the handshaken link and the input device into
//! one [`Supervisor`] and runs it until a shutdown signal arrives. Every error
//! returned from [`run_service`] happened before the first tick and is fatal.

pub mod engine;
pub mod startup;

use crate::config::{AppConfig, ConfigError};
use crate::controller::{CollectorError, EvdevSource};
use crate::link::{LinkError, MavlinkLink, Transmitter};
use crate::mapping::MappingError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use engine::{Supervisor, TickOutcome, TickReport, TickStats};
pub use startup::StartupError;

/// How long shutdown waits for blocking link I/O before abandoning it
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Input(#[from] CollectorError),
}

/// Runs the bridge from preflight checks to clean shutdown
///
/// Returns `Ok` with the loop statistics once `shutdown` fires, including when
/// it fires during the handshake.
pub async fn run_service(
    config: AppConfig,
    transport: &str,
    hid: &Path,
    shutdown: CancellationToken,
) -> Result<TickStats, ServiceError> {
    config.validate()?;
    startup::validate_transport(transport).await?;
    startup::validate_hid(hid).await?;

    let strategy = config
        .supervisor
        .mode
        .create_strategy(&config.override_output)?;

    let link = tokio::select! {
        _ = shutdown.cancelled() => {
            warn!("Shutdown requested during handshake");
            return Ok(TickStats::default());
        }
        link = MavlinkLink::connect(transport, &config.link) => link?,
    };
    info!("Link established on {}", link.address());

    let input = EvdevSource::open(hid)?;
    let transmitter = Transmitter::new(
        Arc::new(link),
        strategy,
        config.link.send_timeout(),
        config.link.heartbeat_interval(),
    );

    let supervisor = Supervisor::create(Box::new(input), transmitter, &config).start();
    let stopped = supervisor.run_until_shutdown(shutdown).await;
    Ok(stopped.finish())
}

/// Runs `future` on a fresh multi-threaded runtime and tears it down
///
/// Blocking MAVLink reads and writes cannot be cancelled, so the runtime is
/// shut down with a `grace` bound instead of waiting for them on drop.
pub fn run_to_completion<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

/// Cancels `shutdown` on SIGINT or SIGTERM
pub fn spawn_signal_handler(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                info!("Interrupt received, shutting down");
            }
            _ = terminate => info!("SIGTERM received, shutting down"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    })
}
