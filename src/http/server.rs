//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the ping handler mounted
//! - Wire up middleware (request id, tracing, timeout, request log)
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::PING_PATH;
use crate::http::request::log_requests;
use crate::lifecycle::ShutdownSignal;
use crate::observability::context::read_headers;
use crate::responder::{Mount, Responder};

impl Mount for Router {
    fn mount(self, path: &str, responder: Arc<Responder>) -> Self {
        self.route(path, get(ping_handler).with_state(responder))
    }
}

/// HTTP server for the responder.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(responder: Arc<Responder>, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(responder, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(responder: Arc<Responder>, request_timeout: Duration) -> Router {
        let log = responder.log();
        Router::new()
            .mount(PING_PATH, responder)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(middleware::from_fn_with_state(log, log_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving it elsewhere or driving it in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn ping_handler(State(responder): State<Arc<Responder>>, headers: HeaderMap) -> Response {
    let parent = responder.parent_from(&read_headers(&headers));
    responder.handle(parent).await.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::ResponderSettings;
    use crate::observability::MemoryLog;
    use crate::queue::MemoryQueue;
    use crate::random::{Jitter, ScriptedRandom};

    fn server(rolls: Vec<u32>, log: Arc<MemoryLog>) -> (HttpServer, Arc<MemoryQueue>) {
        let queue = Arc::new(MemoryQueue::new("test"));
        let responder = Responder::new(queue.clone())
            .with_random(Arc::new(ScriptedRandom::new(rolls)))
            .with_log(log)
            .with_settings(ResponderSettings {
                latency: Jitter::none(),
                fault_die: 10,
            });
        (HttpServer::new(Arc::new(responder), Duration::from_secs(5)), queue)
    }

    #[tokio::test]
    async fn ping_returns_pong_with_request_id() {
        let log = MemoryLog::new();
        let (server, queue) = server(vec![7], log.clone());

        let res = server
            .router()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        let body = to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"pong");
        assert_eq!(queue.len(), 1);

        let record = log.last("all good").unwrap();
        assert_eq!(record.fields.get("status_code"), Some("200"));
        assert!(record.fields.get("dd.trace_id").is_some());
        assert!(record.fields.get("request_id").is_some());
    }

    #[tokio::test]
    async fn injected_fault_is_logged_as_error() {
        let log = MemoryLog::new();
        let (server, queue) = server(vec![1], log.clone());

        let res = server
            .router()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Forbidden");
        assert!(queue.is_empty());

        let record = log.last("something went wrong").unwrap();
        assert_eq!(record.fields.get("status_code"), Some("403"));
        assert_eq!(record.fields.get("status_text"), Some("Forbidden"));
    }

    #[tokio::test]
    async fn inbound_trace_headers_become_parent() {
        let log = MemoryLog::new();
        let (server, _queue) = server(vec![7], log.clone());

        let req = Request::get("/ping")
            .header("x-datadog-trace-id", "1234")
            .header("x-datadog-parent-id", "99")
            .body(Body::empty())
            .unwrap();
        let res = server.router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            log.last("message sent").unwrap().fields.get("dd.trace_id"),
            Some("1234")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_request_is_still_logged() {
        let log = MemoryLog::new();
        let queue = Arc::new(MemoryQueue::new("test"));
        // No fault, then seven one-second latency steps.
        let responder = Responder::new(queue.clone())
            .with_random(Arc::new(ScriptedRandom::new(vec![7])))
            .with_log(log.clone())
            .with_settings(ResponderSettings {
                latency: Jitter::new(Duration::from_secs(1), 10),
                fault_die: 10,
            });
        let server = HttpServer::new(Arc::new(responder), Duration::from_secs(1));

        let res = server
            .router()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(queue.is_empty());

        let record = log.last("something went wrong").unwrap();
        assert_eq!(record.fields.get("status_code"), Some("408"));
        assert!(record.fields.get("request_id").is_some());
        assert!(record.fields.get("dd.trace_id").is_none());
    }

    #[tokio::test]
    async fn only_get_ping_is_routed() {
        let (server, _) = server(vec![7], MemoryLog::new());
        let res = server
            .router()
            .oneshot(Request::get("/pong").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = server
            .router()
            .oneshot(Request::post("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
