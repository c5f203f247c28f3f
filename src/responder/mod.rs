//! Responder: answers pings and hands work to the queue.
//!
//! # Data Flow
//! ```text
//! GET /ping
//!     → fault roll (1 in 10 each: 500, 403, 429 → reply immediately)
//!     → simulated latency
//!     → span "send_message" (child of the caller's context, if any)
//!     → enqueue WorkItem { "ping", dd.trace_id, dd.span_id, span_ctx }
//!     → 200 "pong" | 500 on enqueue failure
//! ```
//!
//! # Design Decisions
//! - The core is free of any HTTP framework; `Mount` is the only seam a
//!   router has to satisfy (see `http::server` for the axum side)
//! - Injected faults are a normal outcome, not an error path
//! - No retries: an enqueue failure ends the request

pub mod handler;
pub mod status;

pub use handler::{Mount, PingReply, Responder};
pub use status::{Status, FAULTS};
