//! Startup orchestration.
//!
//! # Responsibilities
//! - Install logging and the optional metrics exporter
//! - Connect to the configured queue
//! - Wire OS signals to the shutdown coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Steady-state errors never reach this module; the roles log and continue

use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use tracing_subscriber::util::TryInitError;

use crate::config::{ConfigError, ObservabilityConfig, QueueLocation};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::queue::{HttpQueue, MemoryQueue, QueueError, WorkQueue};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot initialize logging: {0}")]
    Logging(#[from] TryInitError),

    #[error("cannot start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("cannot connect to queue: {0}")]
    Queue(#[from] QueueError),
}

/// Install logging, then metrics if an address is configured.
pub fn init_observability(config: &ObservabilityConfig) -> Result<(), StartupError> {
    logging::init_logging(config.log_format)?;
    if let Some(addr) = config.metrics_address {
        metrics::init_metrics(addr)?;
    }
    Ok(())
}

/// Build the queue client for `location`.
pub fn connect_queue(location: &QueueLocation) -> Result<Arc<dyn WorkQueue>, StartupError> {
    match location {
        QueueLocation::Memory => {
            tracing::warn!(
                "Using an in-process queue; messages are not shared with other processes"
            );
            Ok(Arc::new(MemoryQueue::new("memory")))
        }
        QueueLocation::Remote(url) => {
            tracing::info!(queue = %url, "Using remote queue");
            Ok(Arc::new(HttpQueue::new(url.clone())?))
        }
    }
}

/// Trigger `shutdown` when the process receives SIGINT or SIGTERM.
pub fn trigger_on_signal(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });
}
