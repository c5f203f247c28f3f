//! Drainer: the queue consumer.
//!
//! # State Machine
//! ```text
//! Idle → Polling ─┬─ error ──────────────────────────────────→ Idle
//!                 ├─ empty → sleep(backoff) ─────────────────→ Idle
//!                 └─ received → Processing → Deleting ─┬─ ok ─→ Idle
//!                                                      └─ err ─→ Idle
//! ```
//!
//! # Design Decisions
//! - One poll/process/delete sequence at a time
//! - Broken causal context never blocks processing; the message is
//!   handled without trace linkage
//! - A failed delete leaves the message for redelivery after its
//!   visibility timeout; duplicates are possible and not detected

pub mod worker;

pub use worker::{Drainer, Outcome};
