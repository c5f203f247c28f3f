//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber for the process
//! - Provide the `EventLog` capability components record events through
//!
//! # Design Decisions
//! - JSON format by default, pretty format for local runs
//! - Components never log through a global; they hold an `Arc<dyn EventLog>`
//! - `NoopLog` when nothing is supplied, `MemoryLog` for assertions

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::observability::context::{tracer_provider, TRACER_NAME};

const DEFAULT_FILTER: &str = "pingpong=info,tower_http=info";

// Kept for the lifetime of the process so spans keep their processor.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global subscriber. Fails if one is already installed.
///
/// `tracing` spans are bridged onto OpenTelemetry spans, so span ids logged
/// by `tracing` and ids propagated on the wire come from the same provider.
pub fn init_logging(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let provider = TRACER_PROVIDER.get_or_init(tracer_provider);
    global::set_tracer_provider(provider.clone());
    let otel = tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME));

    let (json, pretty) = match format {
        LogFormat::Json => (
            Some(tracing_subscriber::fmt::layer().json().flatten_event(true)),
            None,
        ),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().compact())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(pretty)
        .try_init()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Key/value pairs attached to a log record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<&'static str, String>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &'static str, value: impl ToString) {
        self.0.insert(key, value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Where components send their log events.
pub trait EventLog: Send + Sync {
    fn record(&self, level: Level, message: &str, fields: &Fields);
}

/// Forwards records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

// Keys components attach to records. Each becomes its own structured field;
// anything else is rendered into `extra`.
const KNOWN_KEYS: [&str; 11] = [
    "dd.trace_id",
    "dd.span_id",
    "queue",
    "message_id",
    "receive_count",
    "endpoint",
    "status_code",
    "status_text",
    "path",
    "request_headers",
    "request_id",
];

macro_rules! emit {
    ($level:expr, $message:expr, $fields:expr, $extra:expr) => {
        tracing::event!(
            $level,
            dd.trace_id = $fields.get("dd.trace_id"),
            dd.span_id = $fields.get("dd.span_id"),
            queue = $fields.get("queue"),
            message_id = $fields.get("message_id"),
            receive_count = $fields.get("receive_count"),
            endpoint = $fields.get("endpoint"),
            status_code = $fields.get("status_code"),
            status_text = $fields.get("status_text"),
            path = $fields.get("path"),
            request_headers = $fields.get("request_headers"),
            request_id = $fields.get("request_id"),
            extra = $extra,
            "{}",
            $message
        )
    };
}

impl EventLog for TracingLog {
    fn record(&self, level: Level, message: &str, fields: &Fields) {
        let rest = fields
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(k))
            .fold(Fields::new(), |acc, (k, v)| acc.with(k, v));
        let rendered = rest.iter().next().is_some().then(|| rest.to_string());
        let extra = rendered.as_deref();

        match level {
            Level::Info => emit!(tracing::Level::INFO, message, fields, extra),
            Level::Warn => emit!(tracing::Level::WARN, message, fields, extra),
            Level::Error => emit!(tracing::Level::ERROR, message, fields, extra),
        }
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl EventLog for NoopLog {
    fn record(&self, _level: Level, _message: &str, _fields: &Fields) {}
}

/// A captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Fields,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<Record>>,
}

impl MemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Number of records whose message starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.message.starts_with(prefix))
            .count()
    }

    /// Most recent record whose message starts with `prefix`.
    pub fn last(&self, prefix: &str) -> Option<Record> {
        self.lock()
            .iter()
            .rev()
            .find(|r| r.message.starts_with(prefix))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Record>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EventLog for MemoryLog {
    fn record(&self, level: Level, message: &str, fields: &Fields) {
        self.lock().push(Record {
            level,
            message: message.to_string(),
            fields: fields.clone(),
        });
    }
}
