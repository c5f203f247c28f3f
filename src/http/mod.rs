//! HTTP side of the responder.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, /ping route, graceful shutdown)
//!     → request.rs (request id, per-request log record)
//!     → Responder::handle
//!     → response.rs (PingReply → status + plain-text body)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
