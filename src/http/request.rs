//! Request handling: request ids and the per-request log record.
//!
//! # Responsibilities
//! - Generate a request id (UUID v4) unless the caller sent one
//! - Record one event per request with its status and trace ids
//!
//! # Design Decisions
//! - The handler leaves its span context in the response extensions;
//!   the logging middleware reads it from there after the handler returns
//! - Errors (>= 400) are logged at error level, everything else at info

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::observability::{EventLog, Fields, Level, SpanContext};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Span context of a handled request, stored in response extensions.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext(pub SpanContext);

/// Middleware recording one event per request.
pub async fn log_requests(
    State(log): State<Arc<dyn EventLog>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    let mut fields = Fields::new()
        .with("status_code", status.as_u16())
        .with("status_text", status.canonical_reason().unwrap_or(""))
        .with("path", path)
        .with("request_headers", format_headers(&headers));
    if let Some(id) = headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
        fields.insert("request_id", id);
    }
    if let Some(RequestContext(ctx)) = response.extensions().get::<RequestContext>() {
        fields.insert("dd.trace_id", ctx.trace_id);
        fields.insert("dd.span_id", ctx.span_id);
    }

    if status.as_u16() >= 400 {
        log.record(Level::Error, "something went wrong", &fields);
    } else {
        log.record(Level::Info, "all good", &fields);
    }
    response
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join(";")
}
