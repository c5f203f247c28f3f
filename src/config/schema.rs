//! Configuration schema definitions.
//!
//! One struct per process role plus the timing knobs each role runs with.
//! Everything that is not read from the environment has a `Default`.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::random::Jitter;

/// Where the work queue lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueLocation {
    /// In-process queue, only useful when producer and consumer share a process.
    Memory,
    /// A queue service reachable over HTTP.
    Remote(Url),
}

impl fmt::Display for QueueLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueLocation::Memory => write!(f, "memory"),
            QueueLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Settings shared by every role.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Prometheus scrape endpoint; metrics are not exported when unset.
    pub metrics_address: Option<SocketAddr>,
}

/// Pinger timings.
#[derive(Debug, Clone, Copy)]
pub struct PingerSettings {
    /// Wait before every ping, re-rolled each tick.
    pub interval: Jitter,

    /// Whole-request timeout for a single ping.
    pub request_timeout: Duration,
}

impl Default for PingerSettings {
    fn default() -> Self {
        Self {
            interval: Jitter::new(Duration::from_millis(10), 10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Responder timings and fault odds.
#[derive(Debug, Clone, Copy)]
pub struct ResponderSettings {
    /// Simulated work before enqueueing.
    pub latency: Jitter,

    /// Sides of the fault die. The first few faces map to injected faults;
    /// the rest let the request through.
    pub fault_die: u32,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            latency: Jitter::new(Duration::from_millis(30), 100),
            fault_die: 10,
        }
    }
}

/// Drainer timings.
#[derive(Debug, Clone, Copy)]
pub struct DrainerSettings {
    pub visibility_timeout: Duration,

    /// Long-poll wait; zero means a short poll.
    pub wait_time: Duration,

    /// Sleep after an empty poll.
    pub empty_backoff: Duration,

    /// Simulated processing time per message.
    pub processing: Jitter,
}

impl Default for DrainerSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(10),
            wait_time: Duration::ZERO,
            empty_backoff: Duration::from_secs(10),
            processing: Jitter::new(Duration::from_millis(100), 5),
        }
    }
}

/// `pingpong client`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Vec<Url>,
    pub pinger: PingerSettings,
    pub observability: ObservabilityConfig,
}

/// `pingpong server`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub queue: QueueLocation,
    pub responder: ResponderSettings,

    /// Timeout applied to every inbound request by the HTTP layer.
    pub request_timeout: Duration,
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// `pingpong consumer`
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue: QueueLocation,
    pub drainer: DrainerSettings,
    pub observability: ObservabilityConfig,
}

/// `pingpong queue`
#[derive(Debug, Clone)]
pub struct QueueServiceConfig {
    pub bind_address: SocketAddr,
    pub observability: ObservabilityConfig,
}

/// `pingpong demo`: every role in one process around a memory queue.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub port: u16,
    pub pinger: PingerSettings,
    pub responder: ResponderSettings,
    pub drainer: DrainerSettings,
    pub request_timeout: Duration,
    pub observability: ObservabilityConfig,
}

pub(crate) const DEFAULT_SERVER_ADDR: &str = "http://localhost:8080";
pub(crate) const DEFAULT_QUEUE_BIND: &str = "0.0.0.0:9324";
pub(crate) const DEFAULT_DEMO_PORT: u16 = 8080;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
