//! Causal context propagation.
//!
//! # Responsibilities
//! - Create spans with trace/span identifiers
//! - Serialize a span context into a text map (HTTP headers, queue attributes)
//! - Rebuild a span context on the receiving side
//!
//! # Design Decisions
//! - Spans come from an OpenTelemetry SDK tracer; `tracing` spans are bridged
//!   onto them through `tracing-opentelemetry`
//! - Ids stay within 63 bits so the Datadog view (`dd.trace_id`, decimal) and
//!   the W3C view (`traceparent`, hex) name the same trace
//! - Propagation writes both `traceparent` and the `x-datadog-*` keys;
//!   on extraction the Datadog keys win when both are present

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::text_map_propagator::FieldIter;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{
    Span as _, SpanContext as OtelSpanContext, SpanId, TraceContextExt, TraceFlags, TraceId,
    TraceState, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator, SdkTracer, SdkTracerProvider};
use tokio::time::Instant;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACE_ID_KEY: &str = "x-datadog-trace-id";
pub const PARENT_ID_KEY: &str = "x-datadog-parent-id";
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Instrumentation scope of every span this crate starts.
pub const TRACER_NAME: &str = "pingpong";

/// A serialized span context.
pub type Carrier = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u64,
    pub span_id: u64,
}

impl SpanContext {
    /// The OpenTelemetry form of this context, as received from another process.
    pub fn to_remote(self) -> OtelSpanContext {
        OtelSpanContext::new(
            TraceId::from_bytes(u128::from(self.trace_id).to_be_bytes()),
            SpanId::from_bytes(self.span_id.to_be_bytes()),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        )
    }
}

/// Datadog view of an OpenTelemetry context: the low 64 bits of the trace id.
impl From<&OtelSpanContext> for SpanContext {
    fn from(sc: &OtelSpanContext) -> Self {
        Self {
            trace_id: u128::from_be_bytes(sc.trace_id().to_bytes()) as u64,
            span_id: u64::from_be_bytes(sc.span_id().to_bytes()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("span context not found")]
    NotFound,

    #[error("invalid {key} `{value}`")]
    Invalid { key: &'static str, value: String },

    #[error("cannot decode span context: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("cannot encode span context: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A unit of work in a trace.
pub struct Span {
    name: &'static str,
    context: SpanContext,
    parent: Option<SpanContext>,
    otel: opentelemetry_sdk::trace::Span,
    started: Instant,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("parent", &self.parent)
            .finish()
    }
}

impl Span {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn parent(&self) -> Option<SpanContext> {
        self.parent
    }

    pub fn tag(&mut self, key: &'static str, value: impl ToString) {
        self.otel.set_attribute(KeyValue::new(key, value.to_string()));
    }

    /// A `tracing` span parented on this one, for instrumenting futures.
    pub fn tracing_span(&self) -> tracing::Span {
        let span = tracing::info_span!(
            "span",
            otel.name = self.name,
            dd.trace_id = self.context.trace_id,
            dd.span_id = self.context.span_id,
        );
        // No-op unless an OpenTelemetry layer is installed.
        let parent = Context::new().with_remote_span_context(self.context.to_remote());
        let _ = span.set_parent(parent);
        span
    }

    pub fn finish(mut self) -> Duration {
        self.otel.end();
        let elapsed = self.started.elapsed();
        tracing::debug!(
            span = self.name,
            trace_id = self.context.trace_id,
            span_id = self.context.span_id,
            parent_id = self.parent.map(|p| p.span_id),
            elapsed_ms = elapsed.as_millis() as u64,
            "span finished"
        );
        elapsed
    }
}

/// Starts spans and moves their contexts across process boundaries.
pub trait Tracer: Send + Sync {
    /// Start a span; with a parent it joins the parent's trace.
    fn start_span(&self, name: &'static str, parent: Option<&SpanContext>) -> Span;

    fn inject(&self, context: &SpanContext) -> Result<Carrier, ContextError>;

    fn extract(&self, carrier: &Carrier) -> Result<SpanContext, ContextError>;
}

/// Random ids restricted to positive 63-bit values.
#[derive(Debug, Default)]
pub struct DatadogIdGenerator {
    inner: RandomIdGenerator,
}

impl IdGenerator for DatadogIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        loop {
            let raw = u128::from_be_bytes(self.inner.new_trace_id().to_bytes());
            let id = raw as u64 & LOW_63;
            if id != 0 {
                return TraceId::from_bytes(u128::from(id).to_be_bytes());
            }
        }
    }

    fn new_span_id(&self) -> SpanId {
        loop {
            let id = u64::from_be_bytes(self.inner.new_span_id().to_bytes()) & LOW_63;
            if id != 0 {
                return SpanId::from_bytes(id.to_be_bytes());
            }
        }
    }
}

const LOW_63: u64 = i64::MAX as u64;

/// A tracer provider whose ids fit the Datadog propagation keys.
pub fn tracer_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_id_generator(DatadogIdGenerator::default())
        .build()
}

/// Propagates `x-datadog-trace-id` / `x-datadog-parent-id` as decimal ids.
#[derive(Debug, Default)]
pub struct DatadogPropagator {
    _private: (),
}

fn datadog_fields() -> &'static [String; 2] {
    static FIELDS: OnceLock<[String; 2]> = OnceLock::new();
    FIELDS.get_or_init(|| [TRACE_ID_KEY.to_string(), PARENT_ID_KEY.to_string()])
}

impl TextMapPropagator for DatadogPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let sc = span.span_context();
        if !sc.is_valid() {
            return;
        }
        let ctx = SpanContext::from(sc);
        injector.set(TRACE_ID_KEY, ctx.trace_id.to_string());
        injector.set(PARENT_ID_KEY, ctx.span_id.to_string());
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match parse_datadog(extractor) {
            Ok(ctx) => cx.with_remote_span_context(ctx.to_remote()),
            Err(_) => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(datadog_fields())
    }
}

fn parse_datadog(extractor: &dyn Extractor) -> Result<SpanContext, ContextError> {
    let trace = extractor.get(TRACE_ID_KEY);
    let parent = extractor.get(PARENT_ID_KEY);
    if trace.is_none() && parent.is_none() {
        return Err(ContextError::NotFound);
    }
    Ok(SpanContext {
        trace_id: parse_id(TRACE_ID_KEY, trace)?,
        span_id: parse_id(PARENT_ID_KEY, parent)?,
    })
}

/// Parse a decimal id; zero is not a valid id.
fn parse_id(key: &'static str, raw: Option<&str>) -> Result<u64, ContextError> {
    let raw = raw.ok_or(ContextError::NotFound)?;
    match raw.trim().parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ContextError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

/// W3C trace context followed by the Datadog keys.
pub fn propagator() -> &'static TextMapCompositePropagator {
    static PROPAGATOR: OnceLock<TextMapCompositePropagator> = OnceLock::new();
    PROPAGATOR.get_or_init(|| {
        TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(DatadogPropagator::default()),
        ])
    })
}

/// Default tracer: OpenTelemetry SDK spans, Datadog-compatible ids.
pub struct TextMapTracer {
    _provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl TextMapTracer {
    pub fn new() -> Self {
        Self::with_provider(&tracer_provider())
    }

    pub fn with_provider(provider: &SdkTracerProvider) -> Self {
        Self {
            _provider: provider.clone(),
            tracer: provider.tracer(TRACER_NAME),
        }
    }
}

impl Default for TextMapTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for TextMapTracer {
    fn start_span(&self, name: &'static str, parent: Option<&SpanContext>) -> Span {
        let cx = match parent {
            Some(p) => Context::new().with_remote_span_context(p.to_remote()),
            None => Context::new(),
        };
        let otel = self.tracer.start_with_context(name, &cx);
        Span {
            name,
            context: SpanContext::from(otel.span_context()),
            parent: parent.copied(),
            otel,
            started: Instant::now(),
        }
    }

    fn inject(&self, context: &SpanContext) -> Result<Carrier, ContextError> {
        let cx = Context::new().with_remote_span_context(context.to_remote());
        let mut carrier = Carrier::new();
        propagator().inject_context(&cx, &mut CarrierInjector(&mut carrier));
        if carrier.is_empty() {
            return Err(ContextError::Invalid {
                key: TRACE_ID_KEY,
                value: context.trace_id.to_string(),
            });
        }
        Ok(carrier)
    }

    fn extract(&self, carrier: &Carrier) -> Result<SpanContext, ContextError> {
        let extractor = CarrierExtractor(carrier);
        let cx = propagator().extract_with_context(&Context::new(), &extractor);
        let span = cx.span();
        if span.span_context().is_valid() {
            return Ok(SpanContext::from(span.span_context()));
        }
        match parse_datadog(&extractor) {
            Err(ContextError::NotFound) => match extractor.get(TRACEPARENT_KEY) {
                Some(value) => Err(ContextError::Invalid {
                    key: TRACEPARENT_KEY,
                    value: value.to_string(),
                }),
                None => Err(ContextError::NotFound),
            },
            Err(e) => Err(e),
            Ok(_) => Err(ContextError::NotFound),
        }
    }
}

pub struct CarrierInjector<'a>(pub &'a mut Carrier);

impl Injector for CarrierInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

pub struct CarrierExtractor<'a>(pub &'a Carrier);

impl Extractor for CarrierExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Skips entries that are not valid header names or values.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Serialize a carrier into the JSON blob carried by a queue message.
pub fn encode_blob(carrier: &Carrier) -> Result<String, ContextError> {
    serde_json::to_string(carrier).map_err(ContextError::Encode)
}

pub fn decode_blob(blob: &str) -> Result<Carrier, ContextError> {
    serde_json::from_str(blob).map_err(ContextError::Decode)
}

/// Copy a carrier into request headers.
pub fn write_headers(carrier: &Carrier, headers: &mut HeaderMap) {
    let mut injector = HeaderInjector(headers);
    for (k, v) in carrier {
        injector.set(k, v.clone());
    }
}

/// Collect the propagation headers from a request.
pub fn read_headers(headers: &HeaderMap) -> Carrier {
    let extractor = HeaderExtractor(headers);
    propagator()
        .fields()
        .filter_map(|key| Some((key.to_string(), extractor.get(key)?.to_string())))
        .collect()
}
