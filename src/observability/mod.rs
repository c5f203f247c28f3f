//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pinger / responder / drainer produce:
//!     → logging.rs (EventLog records, forwarded to tracing)
//!     → context.rs (spans, ids propagated through headers and queue attributes)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (JSON or pretty)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace and span ids appear both in logs and in propagated context
//! - Metrics are cheap and safe to record with no exporter installed

pub mod context;
pub mod logging;
pub mod metrics;

pub use context::{Carrier, ContextError, Span, SpanContext, TextMapTracer, Tracer};
pub use logging::{init_logging, EventLog, Fields, Level, MemoryLog, NoopLog, TracingLog};
