//! Pinger: the leaf client.
//!
//! # Data Flow
//! ```text
//! SERVER_ADDR ("http://a:8080,http://b:8080")
//!     → parse_endpoints (path replaced with /ping)
//!     → one task per endpoint:
//!         loop { sleep(jitter) → GET endpoint (trace headers injected) }
//! ```
//!
//! # Design Decisions
//! - Tasks share nothing but the HTTP client and injected capabilities
//! - A failed ping is logged and forgotten; the loop only stops on shutdown
//! - Response bodies are not inspected

pub mod task;

pub use task::{PingError, Pinger};
