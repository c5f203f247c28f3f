//! In-memory queue with visibility timeouts.
//!
//! # Responsibilities
//! - Store messages in arrival order until deleted or expired
//! - Hide a delivered message until its visibility deadline passes
//! - Hand out a fresh receipt on every delivery
//! - Wake long polls when a message arrives

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::queue::{
    Attributes, Delivery, MessageId, QueueError, ReceiptHandle, ReceiveRequest, WorkItem,
    WorkQueue, ALL_ATTRIBUTES,
};

/// Largest batch a single receive returns.
pub const MAX_BATCH: usize = 10;

/// Longest visibility timeout a receive may ask for.
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Longest long-poll a receive may ask for.
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

/// Default message retention.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(4 * 24 * 60 * 60);

#[derive(Debug)]
struct Stored {
    id: MessageId,
    body: String,
    attributes: Attributes,
    sent_at: Instant,
    invisible_until: Option<Instant>,
    receipt: Option<ReceiptHandle>,
    receive_count: u32,
}

impl Stored {
    fn visible_at(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |t| t <= now)
    }
}

pub struct MemoryQueue {
    name: String,
    retention: Duration,
    messages: Mutex<VecDeque<Stored>>,
    arrivals: Notify,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retention: DEFAULT_RETENTION,
            messages: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Messages stored, in flight or not.
    pub fn len(&self) -> usize {
        let mut messages = self.lock();
        self.purge_expired(&mut messages, Instant::now());
        messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages delivered and still within their visibility timeout.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        let mut messages = self.lock();
        self.purge_expired(&mut messages, now);
        messages.iter().filter(|m| !m.visible_at(now)).count()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Stored>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn purge_expired(&self, messages: &mut VecDeque<Stored>, now: Instant) {
        let before = messages.len();
        messages.retain(|m| now.duration_since(m.sent_at) < self.retention);
        let expired = before - messages.len();
        if expired > 0 {
            tracing::debug!(queue = %self.name, expired, "Expired messages purged");
        }
    }

    /// Deliver up to `max_messages` visible messages. Also returns when the
    /// next in-flight message becomes visible again, if any.
    fn take_visible(
        &self,
        request: &ReceiveRequest,
    ) -> Result<(Vec<Delivery>, Option<Instant>), QueueError> {
        let now = Instant::now();
        let hidden_until = deadline(now, request.visibility_timeout)?;
        let max = request.max_messages.clamp(1, MAX_BATCH);
        let mut messages = self.lock();
        self.purge_expired(&mut messages, now);

        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;
        for m in messages.iter_mut() {
            if !m.visible_at(now) {
                next_visible = match (next_visible, m.invisible_until) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (None, b) => b,
                    (a, None) => a,
                };
                continue;
            }
            if batch.len() == max {
                break;
            }
            let receipt = ReceiptHandle(Uuid::new_v4().to_string());
            m.receipt = Some(receipt.clone());
            m.invisible_until = Some(hidden_until);
            m.receive_count += 1;
            batch.push(Delivery {
                message_id: m.id.clone(),
                body: m.body.clone(),
                attributes: select_attributes(&m.attributes, &request.attribute_names),
                receipt,
                receive_count: m.receive_count,
            });
        }
        Ok((batch, next_visible))
    }
}

fn deadline(now: Instant, after: Duration) -> Result<Instant, QueueError> {
    now.checked_add(after)
        .ok_or_else(|| QueueError::InvalidRequest(format!("{after:?} is out of range")))
}

fn validate(request: &ReceiveRequest) -> Result<(), QueueError> {
    if request.visibility_timeout > MAX_VISIBILITY_TIMEOUT {
        return Err(QueueError::InvalidRequest(format!(
            "visibility timeout {:?} exceeds {:?}",
            request.visibility_timeout, MAX_VISIBILITY_TIMEOUT
        )));
    }
    if request.wait_time > MAX_WAIT_TIME {
        return Err(QueueError::InvalidRequest(format!(
            "wait time {:?} exceeds {:?}",
            request.wait_time, MAX_WAIT_TIME
        )));
    }
    Ok(())
}

fn select_attributes(attributes: &Attributes, names: &[String]) -> Attributes {
    if names.iter().any(|n| n == ALL_ATTRIBUTES) {
        return attributes.clone();
    }
    attributes
        .iter()
        .filter(|(k, _)| names.iter().any(|n| n == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: WorkItem) -> Result<MessageId, QueueError> {
        let id = MessageId(Uuid::new_v4().to_string());
        self.lock().push_back(Stored {
            id: id.clone(),
            body: item.body,
            attributes: item.attributes,
            sent_at: Instant::now(),
            invisible_until: None,
            receipt: None,
            receive_count: 0,
        });
        self.arrivals.notify_waiters();
        Ok(id)
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Delivery>, QueueError> {
        validate(request)?;
        let give_up = deadline(Instant::now(), request.wait_time)?;
        loop {
            // Registered before checking so a send in between is not missed.
            let arrival = self.arrivals.notified();
            let (batch, next_visible) = self.take_visible(request)?;
            if !batch.is_empty() || Instant::now() >= give_up {
                return Ok(batch);
            }
            let wake = next_visible.map_or(give_up, |t| t.min(give_up));
            tokio::select! {
                _ = arrival => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut messages = self.lock();
        let position = messages
            .iter()
            .position(|m| m.receipt.as_ref() == Some(receipt));
        match position {
            Some(i) => {
                messages.remove(i);
                Ok(())
            }
            None => Err(QueueError::UnknownReceipt(receipt.clone())),
        }
    }
}
