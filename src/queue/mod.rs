//! Work queue subsystem.
//!
//! # Data Flow
//! ```text
//! responder ──send(WorkItem)──▶ WorkQueue ──receive()──▶ drainer
//!                                   ▲                       │
//!                                   └─────delete(receipt)───┘
//! ```
//!
//! # Design Decisions
//! - At-least-once delivery: a message reappears after its visibility
//!   timeout unless it is deleted with the receipt of its latest delivery
//! - Receipts identify a delivery, not a message
//! - `memory.rs` is the store; `service.rs` exposes it over HTTP and
//!   `remote.rs` is the matching client, so producer and consumer can run
//!   as separate processes

pub mod memory;
pub mod remote;
pub mod service;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryQueue;
pub use remote::HttpQueue;

/// Body of every work item.
pub const PING_BODY: &str = "ping";

/// Decimal trace id of the enqueueing span.
pub const TRACE_ID_ATTR: &str = "dd.trace_id";
/// Decimal span id of the enqueueing span.
pub const SPAN_ID_ATTR: &str = "dd.span_id";
/// JSON text map of the enqueueing span context.
pub const SPAN_CTX_ATTR: &str = "span_ctx";

/// Requesting this attribute name returns every attribute.
pub const ALL_ATTRIBUTES: &str = "All";

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token acknowledging one specific delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(pub String);

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message to enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub body: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl WorkItem {
    /// A ping carrying the causal context of the span that sent it.
    pub fn ping(trace_id: u64, span_id: u64, context_blob: String) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(TRACE_ID_ATTR.to_string(), trace_id.to_string());
        attributes.insert(SPAN_ID_ATTR.to_string(), span_id.to_string());
        attributes.insert(SPAN_CTX_ATTR.to_string(), context_blob);
        Self {
            body: PING_BODY.to_string(),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: usize,
    pub visibility_timeout: Duration,

    /// Zero for a short poll.
    pub wait_time: Duration,
    pub attribute_names: Vec<String>,
}

impl ReceiveRequest {
    /// One message with the causal context attributes.
    pub fn single(visibility_timeout: Duration, wait_time: Duration) -> Self {
        Self {
            max_messages: 1,
            visibility_timeout,
            wait_time,
            attribute_names: vec![
                TRACE_ID_ATTR.to_string(),
                SPAN_ID_ATTR.to_string(),
                SPAN_CTX_ATTR.to_string(),
            ],
        }
    }
}

/// One delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: MessageId,
    pub body: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub receipt: ReceiptHandle,

    /// How many times the message has been handed out, this one included.
    pub receive_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("unknown receipt handle `{0}`")]
    UnknownReceipt(ReceiptHandle),

    #[error("invalid receive request: {0}")]
    InvalidRequest(String),

    #[error("queue transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("queue protocol error: {0}")]
    Protocol(String),
}

/// A managed at-least-once message queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    async fn send(&self, item: WorkItem) -> Result<MessageId, QueueError>;

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Delivery>, QueueError>;

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}
