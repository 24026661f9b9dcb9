//! Library root for `mirk`.
//!
//! Mirk relays events from a publish/subscribe message bus into chat rooms:
//! - Subscribes to build, release and job events on a ZeroMQ bus
//! - Renders each event into HTML-flavored text from a template table
//! - Broadcasts the text to every configured Matrix room
//!
//! Inbound room traffic is ignored. The architecture is built around
//! extensible traits for the bus and chat services, so that either side can
//! be swapped or mocked.

pub mod base;
pub mod event;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use service::{bus::BusClient, chat::ChatClient};
use tokio::signal;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up the services and runs the relay:
/// - Subscribes to the bus
/// - Logs into the chat backend and joins every room
/// - Relays bus messages until the bus fails or a shutdown signal arrives
pub async fn start(config: Config) -> Void {
    info!("Starting mirk ...");

    // Initialize the services.
    let bus = BusClient::zmq(&config)?;
    let chat = ChatClient::matrix(&config)?;

    // Initialize the runtime.
    let mut runtime = runtime::Runtime::new(&config, bus, chat).await?;

    // Run until the bus fails or we are told to stop.
    tokio::select! {
        result = runtime.start() => result,
        _ = shutdown_signal() => {
            info!("Shutting down ...");
            Ok(())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
