//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pingpong::queue::{
    Delivery, MemoryQueue, MessageId, QueueError, ReceiptHandle, ReceiveRequest, WorkItem,
    WorkQueue,
};

/// Raw request heads seen by a mock backend, one entry per request.
pub type Seen = Arc<Mutex<Vec<String>>>;

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Seen)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log = seen.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        log.lock().unwrap().push(head);

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            403 => "403 Forbidden",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}

/// Start a mock backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, Seen) {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match tokio::time::timeout(Duration::from_secs(2), socket.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => buf.extend_from_slice(&chunk[..n]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A memory queue whose operations can be made to fail on demand.
pub struct FlakyQueue {
    pub inner: Arc<MemoryQueue>,
    pub fail_send: AtomicBool,
    pub fail_receive: AtomicBool,
    pub fail_delete: AtomicBool,
    pub sends: AtomicUsize,
    pub receives: AtomicUsize,
    pub deletes: Mutex<Vec<ReceiptHandle>>,
}

impl FlakyQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryQueue::new("flaky")),
            fail_send: AtomicBool::new(false),
            fail_receive: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
            receives: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
        })
    }

    pub fn deleted(&self) -> Vec<ReceiptHandle> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkQueue for FlakyQueue {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn send(&self, item: WorkItem) -> Result<MessageId, QueueError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("send refused".into()));
        }
        self.inner.send(item).await
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Delivery>, QueueError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("receive refused".into()));
        }
        self.inner.receive(request).await
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.deletes.lock().unwrap().push(receipt.clone());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("delete refused".into()));
        }
        self.inner.delete(receipt).await
    }
}
