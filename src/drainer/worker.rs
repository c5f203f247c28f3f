//! Poll, process, delete.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::config::DrainerSettings;
use crate::lifecycle::ShutdownSignal;
use crate::observability::context::decode_blob;
use crate::observability::{
    metrics, EventLog, Fields, Level, NoopLog, SpanContext, TextMapTracer, Tracer,
};
use crate::queue::{
    Delivery, MessageId, ReceiveRequest, WorkQueue, SPAN_CTX_ATTR, SPAN_ID_ATTR, TRACE_ID_ATTR,
};
use crate::random::{RandomSource, SeededRandom};

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    PollFailed,
    Empty,
    Processed(MessageId),
    DeleteFailed(MessageId),
}

pub struct Drainer {
    queue: Arc<dyn WorkQueue>,
    tracer: Arc<dyn Tracer>,
    random: Arc<dyn RandomSource>,
    log: Arc<dyn EventLog>,
    settings: DrainerSettings,
}

impl Drainer {
    /// A drainer with a no-op log, a random tracer and an entropy-seeded
    /// random source.
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            queue,
            tracer: Arc::new(TextMapTracer::new()),
            random: Arc::new(SeededRandom::from_entropy()),
            log: Arc::new(NoopLog),
            settings: DrainerSettings::default(),
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

    pub fn with_settings(mut self, settings: DrainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loop until `shutdown` fires. An iteration in progress is abandoned.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        tracing::info!(queue = %self.queue.name(), "Drainer starting");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = self.work_once() => {}
            }
        }
        tracing::info!("Drainer stopped");
    }

    /// Run exactly one iteration of the state machine.
    pub async fn work_once(&self) -> Outcome {
        let request =
            ReceiveRequest::single(self.settings.visibility_timeout, self.settings.wait_time);
        let mut fields = Fields::new().with("queue", self.queue.name());

        let batch = match self.queue.receive(&request).await {
            Ok(batch) => batch,
            Err(e) => {
                self.log
                    .record(Level::Error, &format!("queue: read message: {}", e), &fields);
                metrics::record_queue_error("receive");
                return Outcome::PollFailed;
            }
        };

        let Some(delivery) = batch.into_iter().next() else {
            self.log.record(Level::Info, "no messages", &fields);
            metrics::record_empty_poll();
            tokio::time::sleep(self.settings.empty_backoff).await;
            return Outcome::Empty;
        };

        for key in [TRACE_ID_ATTR, SPAN_ID_ATTR] {
            if let Some(value) = delivery.attributes.get(key) {
                fields.insert(key, value);
            }
        }
        fields.insert("message_id", &delivery.message_id);
        fields.insert("receive_count", delivery.receive_count);

        let parent = self.link(&delivery, &fields);
        let span = self.tracer.start_span("process_message", parent.as_ref());

        let started = Instant::now();
        let work = self.settings.processing.sample(self.random.as_ref());
        let deleted = async {
            tokio::time::sleep(work).await;
            self.queue.delete(&delivery.receipt).await
        }
        .instrument(span.tracing_span())
        .await;
        span.finish();

        match deleted {
            Ok(()) => {
                self.log.record(Level::Info, "message processed", &fields);
                metrics::record_message_processed(started.elapsed());
                Outcome::Processed(delivery.message_id)
            }
            Err(e) => {
                self.log
                    .record(Level::Error, &format!("queue: delete message: {}", e), &fields);
                metrics::record_queue_error("delete");
                Outcome::DeleteFailed(delivery.message_id)
            }
        }
    }

    /// Rebuild the enqueueing span's context from message attributes.
    fn link(&self, delivery: &Delivery, fields: &Fields) -> Option<SpanContext> {
        let Some(blob) = delivery.attributes.get(SPAN_CTX_ATTR) else {
            self.log.record(
                Level::Warn,
                &format!("cannot decode span context: missing {} attribute", SPAN_CTX_ATTR),
                fields,
            );
            return None;
        };
        let carrier = match decode_blob(blob) {
            Ok(carrier) => carrier,
            Err(e) => {
                self.log.record(Level::Warn, &e.to_string(), fields);
                return None;
            }
        };
        match self.tracer.extract(&carrier) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                self.log.record(
                    Level::Warn,
                    &format!("cannot extract span context: {}", e),
                    fields,
                );
                None
            }
        }
    }
}
