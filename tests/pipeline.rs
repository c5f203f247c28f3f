//! Responder → queue → drainer, in one process.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pingpong::config::{DrainerSettings, ResponderSettings};
use pingpong::observability::{Level, MemoryLog, TextMapTracer};
use pingpong::random::{Jitter, ScriptedRandom, SeededRandom};
use pingpong::responder::Status;
use pingpong::{Drainer, Outcome, Responder};

mod common;
use common::FlakyQueue;

fn responder(queue: Arc<FlakyQueue>, rolls: Vec<u32>, log: Arc<MemoryLog>) -> Responder {
    Responder::new(queue)
        .with_tracer(Arc::new(TextMapTracer::new()))
        .with_random(Arc::new(ScriptedRandom::new(rolls)))
        .with_log(log)
        .with_settings(ResponderSettings {
            latency: Jitter::none(),
            fault_die: 10,
        })
}

fn drainer(queue: Arc<FlakyQueue>, log: Arc<MemoryLog>) -> Drainer {
    Drainer::new(queue)
        .with_tracer(Arc::new(TextMapTracer::new()))
        .with_random(Arc::new(ScriptedRandom::new(vec![0])))
        .with_log(log)
        .with_settings(DrainerSettings::default())
}

#[tokio::test(start_paused = true)]
async fn trace_attributes_round_trip() {
    let queue = FlakyQueue::new();
    let responder_log = MemoryLog::new();
    let drainer_log = MemoryLog::new();

    let reply = responder(queue.clone(), vec![9], responder_log.clone())
        .handle(None)
        .await;
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.body, "pong");
    let ctx = reply.context.unwrap();

    let d = drainer(queue.clone(), drainer_log.clone());
    let outcome = d.work_once().await;
    assert_eq!(outcome, Outcome::Processed(reply.message_id.unwrap()));

    let processed = drainer_log.last("message processed").unwrap();
    assert_eq!(processed.fields.get("dd.trace_id"), Some(ctx.trace_id.to_string().as_str()));
    assert_eq!(processed.fields.get("dd.span_id"), Some(ctx.span_id.to_string().as_str()));
    assert!(
        drainer_log.records().iter().all(|r| r.level == Level::Info),
        "context extraction should not warn"
    );
    assert_eq!(queue.deleted().len(), 1);
    assert!(queue.inner.is_empty());
}

#[tokio::test]
async fn enqueue_failure_returns_500_without_side_effects() {
    let queue = FlakyQueue::new();
    queue.fail_send.store(true, Ordering::SeqCst);
    let log = MemoryLog::new();

    let reply = responder(queue.clone(), vec![9], log.clone()).handle(None).await;
    assert_eq!(reply.status, Status::InternalServerError);
    assert_eq!(reply.body, "Internal Server Error");
    assert!(reply.message_id.is_none());

    assert_eq!(queue.sends.load(Ordering::SeqCst), 1, "no retry");
    assert!(queue.inner.is_empty());
    assert_eq!(log.last("queue: send message").unwrap().level, Level::Error);
    assert_eq!(log.count("message sent"), 0);
}

#[tokio::test]
async fn faults_never_touch_the_queue() {
    let queue = FlakyQueue::new();
    let log = MemoryLog::new();
    let r = responder(queue.clone(), vec![0, 1, 2], log);

    let codes: Vec<u16> = [
        r.handle(None).await,
        r.handle(None).await,
        r.handle(None).await,
    ]
    .iter()
    .map(|reply| reply.status.code())
    .collect();
    assert_eq!(codes, vec![500, 403, 429]);
    assert_eq!(queue.sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_pong_has_exactly_one_enqueue() {
    let queue = FlakyQueue::new();
    let r = Responder::new(queue.clone())
        .with_random(Arc::new(SeededRandom::from_seed(2024)))
        .with_settings(ResponderSettings {
            latency: Jitter::none(),
            fault_die: 10,
        });

    let mut pongs = 0;
    for _ in 0..200 {
        let reply = r.handle(None).await;
        match reply.status {
            Status::Ok => pongs += 1,
            other => assert!(matches!(
                other,
                Status::InternalServerError | Status::Forbidden | Status::TooManyRequests
            )),
        }
    }
    assert!(pongs > 0 && pongs < 200);
    assert_eq!(queue.sends.load(Ordering::SeqCst), pongs);
    assert_eq!(queue.inner.len(), pongs);
}

#[tokio::test(start_paused = true)]
async fn empty_polls_log_once_each_and_never_delete() {
    let queue = FlakyQueue::new();
    let log = MemoryLog::new();
    let d = drainer(queue.clone(), log.clone());

    for i in 1..=3 {
        let started = tokio::time::Instant::now();
        assert_eq!(d.work_once().await, Outcome::Empty);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(log.count("no messages"), i);
    }
    assert!(queue.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_failure_moves_straight_on() {
    let queue = FlakyQueue::new();
    queue.fail_receive.store(true, Ordering::SeqCst);
    let log = MemoryLog::new();
    let d = drainer(queue.clone(), log.clone());

    let started = tokio::time::Instant::now();
    assert_eq!(d.work_once().await, Outcome::PollFailed);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(log.last("queue: read message").unwrap().level, Level::Error);
    assert!(queue.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_context_is_deleted_with_its_receipt() {
    let queue = FlakyQueue::new();
    let log = MemoryLog::new();
    let item = pingpong::queue::WorkItem::ping(5, 6, "not json".into());
    pingpong::WorkQueue::send(queue.as_ref(), item).await.unwrap();

    let d = drainer(queue.clone(), log.clone());
    assert!(matches!(d.work_once().await, Outcome::Processed(_)));
    assert_eq!(queue.deleted().len(), 1);
    assert!(queue.inner.is_empty());

    let warn = log.last("cannot decode span context").unwrap();
    assert_eq!(warn.level, Level::Warn);
    assert_eq!(warn.fields.get("dd.trace_id"), Some("5"));
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_redelivered_after_visibility_timeout() {
    let queue = FlakyQueue::new();
    let log = MemoryLog::new();
    let reply = responder(queue.clone(), vec![9], MemoryLog::new()).handle(None).await;
    let id = reply.message_id.unwrap();

    queue.fail_delete.store(true, Ordering::SeqCst);
    let d = drainer(queue.clone(), log.clone());
    assert_eq!(d.work_once().await, Outcome::DeleteFailed(id.clone()));
    assert_eq!(queue.inner.len(), 1, "message stays queued");
    assert_eq!(log.last("queue: delete message").unwrap().level, Level::Error);

    // Hidden for the visibility timeout; the drainer backs off meanwhile.
    queue.fail_delete.store(false, Ordering::SeqCst);
    assert_eq!(d.work_once().await, Outcome::Empty);

    assert_eq!(d.work_once().await, Outcome::Processed(id));
    assert!(queue.inner.is_empty());

    let receipts = queue.deleted();
    assert_eq!(receipts.len(), 2);
    assert_ne!(receipts[0], receipts[1]);
    assert_eq!(
        log.last("message processed").unwrap().fields.get("receive_count"),
        Some("2")
    );
}
