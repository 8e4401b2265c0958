//! End-to-end scenarios: event in, delete out, outcomes recorded.
//!
//! Time is paused, so suppression windows and backoff are exercised without
//! real sleeps.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pvwatch_core::{Event, ObjectMeta, ObjectReference, Pod, PodPhase};
use pvwatch_reconciler::{
    Classification, Controller, ControllerConfig, DEFAULT_NOTE_PATTERN, Error, EventIngestor,
    InMemoryPodStore, Ingested, MemoryRecorder, NotePattern, PodDeleter, Reconciler, Result,
    SuppressionPolicy, TriggerIndex,
};
use pvwatch_workqueue::{ItemExponentialFailureRateLimiter, WorkQueue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WINDOW: Duration = Duration::from_secs(60);
const SETTLE: Duration = Duration::from_millis(100);
const CINDER_NOTE: &str =
    "AttachVolume.WaitForAttach failed for Cinder disk \"6f1c\": devicePath is empty";

/// Deleter that fails its first `failures` calls.
struct FlakyDeleter {
    calls: AtomicUsize,
    failures: Mutex<usize>,
}

impl FlakyDeleter {
    fn new(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: Mutex::new(failures),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PodDeleter for FlakyDeleter {
    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::sink(format!(
                "DELETE {namespace}/{name}: 503 Service Unavailable"
            )));
        }
        Ok(())
    }
}

struct Harness {
    queue: Arc<WorkQueue<String>>,
    ingestor: EventIngestor,
    deleter: Arc<FlakyDeleter>,
    recorder: Arc<MemoryRecorder>,
    token: CancellationToken,
    runner: JoinHandle<Result<()>>,
}

impl Harness {
    fn start(policy: SuppressionPolicy, failures: usize) -> Self {
        let queue = Arc::new(WorkQueue::new(
            "pods",
            ItemExponentialFailureRateLimiter::new(Duration::from_secs(1), Duration::from_secs(60)),
        ));
        let store = Arc::new(InMemoryPodStore::with_pods([
            Pod::new("default", "web-0", PodPhase::Pending).on_node("node-a"),
        ]));
        let deleter = Arc::new(FlakyDeleter::new(failures));
        let recorder = Arc::new(MemoryRecorder::new());
        let triggers = Arc::new(TriggerIndex::new());

        let reconciler = Reconciler::builder()
            .with_store(store.clone())
            .with_deleter(deleter.clone())
            .with_recorder(recorder.clone())
            .with_triggers(triggers.clone())
            .suppression_policy(policy)
            .suppression_window(WINDOW)
            .build()
            .expect("reconciler builds");
        let ingestor = EventIngestor::new(
            queue.clone(),
            NotePattern::new(DEFAULT_NOTE_PATTERN).expect("default pattern compiles"),
            triggers,
            recorder.clone(),
        );

        let controller = Controller::new(
            queue.clone(),
            store,
            Arc::new(reconciler),
            ControllerConfig {
                sweep_interval: WINDOW,
                ..ControllerConfig::default()
            },
        );
        let token = CancellationToken::new();
        let runner = {
            let token = token.clone();
            tokio::spawn(async move { controller.run(token).await })
        };

        Self {
            queue,
            ingestor,
            deleter,
            recorder,
            token,
            runner,
        }
    }

    async fn stop(self) {
        self.token.cancel();
        self.runner.await.unwrap().unwrap();
    }
}

fn event(name: &str, note: &str) -> Event {
    Event {
        metadata: ObjectMeta::new("default", name),
        note: note.to_string(),
        reason: "FailedMount".to_string(),
        regarding: Some(ObjectReference {
            kind: "Pod".to_string(),
            namespace: "default".to_string(),
            name: "web-0".to_string(),
        }),
    }
}

async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

#[tokio::test(start_paused = true)]
async fn repeat_event_inside_window_is_suppressed() {
    let h = Harness::start(SuppressionPolicy::default(), 0);

    h.ingestor.on_add(&event("web-0.1", CINDER_NOTE));
    settle().await;
    assert_eq!(h.deleter.calls(), 1);
    let first = h.recorder.last().unwrap();
    assert_eq!(first.classification, Classification::Ok);
    assert_eq!(first.event, "default/web-0.1");
    assert_eq!(first.pod, "default/web-0");
    assert_eq!(first.node, "node-a");

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.ingestor.on_add(&event("web-0.2", CINDER_NOTE));
    settle().await;

    assert_eq!(h.deleter.calls(), 1);
    let second = h.recorder.last().unwrap();
    assert_eq!(second.classification, Classification::AlreadySuppressed);
    assert_eq!(second.event, "default/web-0.2");

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn repeat_event_after_window_deletes_again() {
    let h = Harness::start(SuppressionPolicy::default(), 0);

    h.ingestor.on_add(&event("web-0.1", CINDER_NOTE));
    settle().await;
    assert_eq!(h.deleter.calls(), 1);

    tokio::time::sleep(Duration::from_secs(70)).await;
    h.ingestor.on_add(&event("web-0.2", CINDER_NOTE));
    settle().await;

    assert_eq!(h.deleter.calls(), 2);
    assert_eq!(
        h.recorder.classifications(),
        vec![Classification::Ok, Classification::Ok]
    );

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unrelated_event_never_enqueues() {
    let h = Harness::start(SuppressionPolicy::default(), 0);

    let result = h.ingestor.on_add(&event("web-0.3", "Started container nginx"));
    settle().await;

    assert_eq!(result, Ingested::Skipped(Classification::EventMismatch));
    assert_eq!(h.queue.len(), 0);
    assert_eq!(h.queue.waiting_len(), 0);
    assert_eq!(h.deleter.calls(), 0);
    assert_eq!(
        h.recorder.classifications(),
        vec![Classification::EventMismatch]
    );

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_suppressed_on_retry_before_action() {
    let h = Harness::start(SuppressionPolicy::BeforeAction, 1);
    let key = "default/web-0".to_string();

    h.ingestor.on_add(&event("web-0.1", CINDER_NOTE));
    settle().await;

    assert_eq!(h.deleter.calls(), 1);
    assert_eq!(h.recorder.last().unwrap().classification, Classification::ActionFailed);
    assert_eq!(h.queue.num_requeues(&key), 1, "failure is not forgotten");
    assert_eq!(h.queue.waiting_len(), 1, "retry waits out its backoff");

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.deleter.calls(), 1);
    assert_eq!(
        h.recorder.classifications(),
        vec![Classification::ActionFailed, Classification::AlreadySuppressed]
    );
    assert_eq!(h.queue.num_requeues(&key), 0);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_retried_after_success_policy() {
    let h = Harness::start(SuppressionPolicy::AfterSuccess, 1);
    let key = "default/web-0".to_string();

    h.ingestor.on_add(&event("web-0.1", CINDER_NOTE));
    settle().await;

    assert_eq!(h.recorder.last().unwrap().classification, Classification::ActionFailed);
    assert_eq!(h.queue.num_requeues(&key), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.deleter.calls(), 2);
    let outcomes = h.recorder.all();
    assert_eq!(
        outcomes.iter().map(|o| o.classification).collect::<Vec<_>>(),
        vec![Classification::ActionFailed, Classification::Ok]
    );
    assert!(outcomes.iter().all(|o| o.event == "default/web-0.1"));
    assert!(!outcomes[0].error.is_empty());
    assert_eq!(h.queue.num_requeues(&key), 0);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_deletes_once() {
    let h = Harness::start(SuppressionPolicy::default(), 0);

    for i in 0..5 {
        h.ingestor.on_add(&event(&format!("web-0.{i}"), CINDER_NOTE));
    }
    settle().await;

    assert_eq!(h.deleter.calls(), 1);
    assert_eq!(h.recorder.count(Classification::Ok), 1);
    assert_eq!(h.recorder.last().unwrap().event, "default/web-0.4");

    h.stop().await;
}
