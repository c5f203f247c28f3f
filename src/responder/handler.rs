//! Ping handling.

use std::sync::Arc;

use tracing::Instrument;

use crate::config::ResponderSettings;
use crate::observability::context::{encode_blob, Carrier};
use crate::observability::{
    metrics, EventLog, Fields, Level, NoopLog, SpanContext, TextMapTracer, Tracer,
};
use crate::queue::{MessageId, WorkItem, WorkQueue};
use crate::random::{RandomSource, SeededRandom};
use crate::responder::status::{Status, FAULTS};

/// Body of a successful reply.
pub const PONG: &str = "pong";

/// Blob sent when the span context cannot be serialized.
const EMPTY_CONTEXT: &str = "{}";

/// Outcome of one ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    pub status: Status,
    pub body: String,

    /// The `send_message` span when one was started, else the caller's context.
    pub context: Option<SpanContext>,
    pub message_id: Option<MessageId>,
}

impl PingReply {
    fn pong(context: SpanContext, message_id: MessageId) -> Self {
        Self {
            status: Status::Ok,
            body: PONG.to_string(),
            context: Some(context),
            message_id: Some(message_id),
        }
    }

    fn error(status: Status, context: Option<SpanContext>) -> Self {
        Self {
            status,
            body: status.reason().to_string(),
            context,
            message_id: None,
        }
    }
}

/// Anything that can route a path to the responder.
pub trait Mount: Sized {
    fn mount(self, path: &str, responder: Arc<Responder>) -> Self;
}

pub struct Responder {
    queue: Arc<dyn WorkQueue>,
    tracer: Arc<dyn Tracer>,
    random: Arc<dyn RandomSource>,
    log: Arc<dyn EventLog>,
    settings: ResponderSettings,
}

impl Responder {
    /// A responder with a no-op log, a random tracer and an entropy-seeded
    /// random source.
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            queue,
            tracer: Arc::new(TextMapTracer::new()),
            random: Arc::new(SeededRandom::from_entropy()),
            log: Arc::new(NoopLog),
            settings: ResponderSettings::default(),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_settings(mut self, settings: ResponderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn log(&self) -> Arc<dyn EventLog> {
        self.log.clone()
    }

    /// Caller's span context from propagation headers. Absent or unreadable
    /// context starts a new trace.
    pub fn parent_from(&self, carrier: &Carrier) -> Option<SpanContext> {
        if carrier.is_empty() {
            return None;
        }
        match self.tracer.extract(carrier) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring inbound span context");
                None
            }
        }
    }

    /// Handle one ping.
    pub async fn handle(&self, parent: Option<SpanContext>) -> PingReply {
        if let Some(fault) = self.roll_fault() {
            metrics::record_response(fault.code());
            return PingReply::error(fault, parent);
        }

        tokio::time::sleep(self.settings.latency.sample(self.random.as_ref())).await;

        let mut span = self.tracer.start_span("send_message", parent.as_ref());
        span.tag("queue", self.queue.name());
        let ctx = span.context();
        let mut fields = Fields::new()
            .with("dd.trace_id", ctx.trace_id)
            .with("dd.span_id", ctx.span_id);

        let blob = match self.tracer.inject(&ctx).and_then(|c| encode_blob(&c)) {
            Ok(blob) => blob,
            Err(e) => {
                self.log.record(
                    Level::Warn,
                    &format!("cannot encode span context: {}", e),
                    &fields,
                );
                EMPTY_CONTEXT.to_string()
            }
        };

        let sent = self
            .queue
            .send(WorkItem::ping(ctx.trace_id, ctx.span_id, blob))
            .instrument(span.tracing_span())
            .await;
        span.finish();

        match sent {
            Ok(message_id) => {
                fields.insert("message_id", &message_id);
                self.log.record(Level::Info, "message sent", &fields);
                metrics::record_message_sent();
                metrics::record_response(Status::Ok.code());
                PingReply::pong(ctx, message_id)
            }
            Err(e) => {
                self.log.record(
                    Level::Error,
                    &format!("queue: send message: {}", e),
                    &fields,
                );
                metrics::record_queue_error("send");
                metrics::record_response(Status::InternalServerError.code());
                PingReply::error(Status::InternalServerError, Some(ctx))
            }
        }
    }

    fn roll_fault(&self) -> Option<Status> {
        let roll = self.random.below(self.settings.fault_die);
        FAULTS.get(roll as usize).copied()
    }
}
