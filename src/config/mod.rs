//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment (or injected key/value pairs)
//!     → loader.rs (look up keys, blank = unset)
//!     → validation.rs (parse ports, addresses, endpoint lists)
//!     → ClientConfig / ServerConfig / ConsumerConfig / ...
//!     → handed to the role at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Missing or unparseable required settings abort startup
//! - Timings are not environment driven; they have code defaults

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, ConfigSource};
pub use schema::{
    ClientConfig, ConsumerConfig, DemoConfig, DrainerSettings, LogFormat, ObservabilityConfig,
    PingerSettings, QueueLocation, QueueServiceConfig, ResponderSettings, ServerConfig,
};
pub use validation::{parse_endpoints, PING_PATH};
