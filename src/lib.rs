//! Ping/pong services demonstrating causal tracing across HTTP and a queue.
//!
//! ```text
//!  pinger ──GET /ping──▶ responder ──send──▶ queue ──receive──▶ drainer
//!  (client)              (server)                              (consumer)
//! ```
//!
//! Each hop carries the span context forward: in HTTP headers from the
//! pinger to the responder, in message attributes from the responder to
//! the drainer.

// Roles
pub mod drainer;
pub mod pinger;
pub mod responder;

// Plumbing
pub mod config;
pub mod http;
pub mod queue;
pub mod random;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ConfigSource;
pub use drainer::{Drainer, Outcome};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pinger::Pinger;
pub use queue::{MemoryQueue, WorkQueue};
pub use responder::Responder;
