//! End-to-end tests wiring the store, dispatcher, publish trigger, and
//! reconciler together against mocked remote surfaces.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sundial_publish::{
    PublishTrigger, Reconciler, RecordsClient, RetryTracker, TriggerConfig, WebhookClient,
};
use sundial_scheduler::{Dispatcher, EnqueueMode, Job, JobStore};

struct Harness {
    store: Arc<JobStore>,
    retries: Arc<RetryTracker>,
    records: MockServer,
    webhook: MockServer,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Wire the full firing path with a compressed retry delay.
    async fn start(retry_delay_secs: i64) -> Self {
        let dir = tempdir().unwrap();
        let store = Arc::new(JobStore::open(dir.path().join("jobs.json")).await.unwrap());
        let records = MockServer::start().await;
        let webhook = MockServer::start().await;
        let retries = Arc::new(RetryTracker::new());

        let trigger = Arc::new(
            PublishTrigger::new(
                Arc::clone(&store),
                Arc::new(RecordsClient::new(records.uri())),
                Arc::new(WebhookClient::new(format!("{}/hook", webhook.uri()))),
                Arc::clone(&retries),
            )
            .with_config(TriggerConfig {
                max_retries: 3,
                retry_delay: chrono::Duration::seconds(retry_delay_secs),
            }),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = {
            let store = Arc::clone(&store);
            let executor = trigger.into_executor();
            tokio::spawn(async move {
                Dispatcher::new(store)
                    .with_worker_count(2)
                    .run(shutdown_rx, executor)
                    .await;
            })
        };

        Self {
            store,
            retries,
            records,
            webhook,
            shutdown_tx,
            dispatcher,
            _dir: dir,
        }
    }

    async fn webhook_hits(&self) -> usize {
        self.webhook
            .received_requests()
            .await
            .map(|reqs| reqs.len())
            .unwrap_or(0)
    }

    async fn wait_for_webhook_hits(&self, want: usize, deadline: Duration) {
        timeout(deadline, async {
            loop {
                if self.webhook_hits().await >= want {
                    break;
                }
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("webhook never reached {want} hits"));
    }

    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        self.dispatcher.await.unwrap();
    }
}

async fn mock_patch_ok(server: &MockServer) {
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn scheduled_post_fires_through_the_webhook() {
    let h = Harness::start(1).await;
    mock_patch_ok(&h.records).await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.webhook)
        .await;

    h.store
        .enqueue(
            Job::new("p1", Utc::now() - chrono::Duration::seconds(1)),
            EnqueueMode::RejectIfExists,
        )
        .await
        .unwrap();

    h.wait_for_webhook_hits(1, Duration::from_secs(5)).await;
    h.stop().await;
}

#[tokio::test]
async fn failed_firing_retries_and_recovers() {
    let h = Harness::start(1).await;
    mock_patch_ok(&h.records).await;

    // First attempt fails, every later one succeeds
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&h.webhook)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.webhook)
        .await;

    h.store
        .enqueue(
            Job::new("p1", Utc::now() - chrono::Duration::seconds(1)),
            EnqueueMode::RejectIfExists,
        )
        .await
        .unwrap();

    h.wait_for_webhook_hits(2, Duration::from_secs(10)).await;

    // Give the success path a beat to settle, then check no residue
    timeout(Duration::from_secs(5), async {
        loop {
            if h.retries.count("p1").await == 0 && h.store.pending_count().await == 0 {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("retry state never cleared");

    h.stop().await;
}

#[tokio::test]
async fn reconciled_post_fires_through_the_webhook() {
    let h = Harness::start(1).await;
    mock_patch_ok(&h.records).await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.webhook)
        .await;

    let missed = (Utc::now() - chrono::Duration::minutes(30)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "p1", "scheduledAt": missed, "status": "scheduled" }
        ])))
        .mount(&h.records)
        .await;

    let reconciler = Reconciler::new(
        Arc::clone(&h.store),
        Arc::new(RecordsClient::new(h.records.uri())),
    )
    .with_settle_delay(chrono::Duration::zero());

    assert_eq!(reconciler.reconcile().await, 1);

    // The recovered job flows through the normal dispatch path
    h.wait_for_webhook_hits(1, Duration::from_secs(5)).await;
    h.stop().await;
}
