//! HTTP front for a `MemoryQueue`.
//!
//! # Routes
//! - `POST /messages` (JSON `WorkItem`) → `{"message_id": ...}`
//! - `POST /messages/receive` (JSON `ReceiveBody`) → `[Delivery]`
//!   or 400 when a timeout is out of range
//! - `DELETE /messages/{receipt}` → 204, or 404 for an unknown receipt

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::lifecycle::ShutdownSignal;
use crate::queue::{
    Delivery, MemoryQueue, MessageId, QueueError, ReceiptHandle, ReceiveRequest, WorkItem,
    WorkQueue,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub message_id: MessageId,
}

/// Wire form of a `ReceiveRequest`; durations in milliseconds.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveBody {
    pub max_messages: usize,
    pub visibility_timeout_ms: u64,
    #[serde(default)]
    pub wait_time_ms: u64,
    #[serde(default)]
    pub attribute_names: Vec<String>,
}

impl From<&ReceiveRequest> for ReceiveBody {
    fn from(r: &ReceiveRequest) -> Self {
        Self {
            max_messages: r.max_messages,
            visibility_timeout_ms: millis(r.visibility_timeout),
            wait_time_ms: millis(r.wait_time),
            attribute_names: r.attribute_names.clone(),
        }
    }
}

impl From<ReceiveBody> for ReceiveRequest {
    fn from(b: ReceiveBody) -> Self {
        Self {
            max_messages: b.max_messages,
            visibility_timeout: Duration::from_millis(b.visibility_timeout_ms),
            wait_time: Duration::from_millis(b.wait_time_ms),
            attribute_names: b.attribute_names,
        }
    }
}

// Saturates; the queue rejects anything that large anyway.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = match self {
            QueueError::UnknownReceipt(_) => StatusCode::NOT_FOUND,
            QueueError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(queue: Arc<MemoryQueue>) -> Router {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/receive", post(receive_messages))
        .route("/messages/{receipt}", delete(delete_message))
        .with_state(queue)
        .layer(TraceLayer::new_for_http())
}

async fn send_message(
    State(queue): State<Arc<MemoryQueue>>,
    Json(item): Json<WorkItem>,
) -> Result<Json<SendResponse>, QueueError> {
    let message_id = queue.send(item).await?;
    tracing::debug!(queue = %queue.name(), message_id = %message_id, "Message stored");
    Ok(Json(SendResponse { message_id }))
}

async fn receive_messages(
    State(queue): State<Arc<MemoryQueue>>,
    Json(body): Json<ReceiveBody>,
) -> Result<Json<Vec<Delivery>>, QueueError> {
    let request = ReceiveRequest::from(body);
    Ok(Json(queue.receive(&request).await?))
}

async fn delete_message(
    State(queue): State<Arc<MemoryQueue>>,
    Path(receipt): Path<String>,
) -> Result<StatusCode, QueueError> {
    queue.delete(&ReceiptHandle(receipt)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve `queue` until `shutdown` fires.
pub async fn serve(
    queue: Arc<MemoryQueue>,
    listener: TcpListener,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, queue = %queue.name(), "Queue service starting");

    axum::serve(listener, router(queue))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!("Queue service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn receive_call(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/messages/receive")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn deliveries(res: Response) -> Vec<Delivery> {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn out_of_range_visibility_is_a_bad_request() {
        let queue = Arc::new(MemoryQueue::new("svc"));
        queue.send(WorkItem::ping(1, 2, "{}".into())).await.unwrap();
        let app = router(queue.clone());

        let res = app
            .clone()
            .oneshot(receive_call(serde_json::json!({
                "max_messages": 1,
                "visibility_timeout_ms": u64::MAX,
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        // The service is still up and the message untouched.
        let res = app
            .oneshot(receive_call(serde_json::json!({
                "max_messages": 1,
                "visibility_timeout_ms": 10_000,
                "attribute_names": ["All"],
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let batch = deliveries(res).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 1);
    }

    #[tokio::test]
    async fn overlong_wait_is_a_bad_request() {
        let app = router(Arc::new(MemoryQueue::new("svc")));
        let res = app
            .oneshot(receive_call(serde_json::json!({
                "max_messages": 1,
                "visibility_timeout_ms": 1_000,
                "wait_time_ms": 60_000,
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wire_keeps_sub_second_durations() {
        let req = ReceiveRequest::single(Duration::from_millis(500), Duration::from_millis(250));
        let body = ReceiveBody::from(&req);
        assert_eq!(body.visibility_timeout_ms, 500);
        assert_eq!(body.wait_time_ms, 250);
        assert_eq!(ReceiveRequest::from(body), req);

        let huge = ReceiveRequest::single(Duration::MAX, Duration::ZERO);
        assert_eq!(ReceiveBody::from(&huge).visibility_timeout_ms, u64::MAX);
    }
}
