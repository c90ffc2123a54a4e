use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    http::StatusCode as AxumStatus,
    routing::{get, post},
    Json, Router,
};
use jobshift_core::SourceKind;
use jobshift_infra::HttpTargetClient;
use jobshift_live::{MigrationProxy, MigrationSession};
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

const SIDEKIQ_JOB: &str = r#"{"class":"EmailWorker","args":["test@example.com"],"jid":"abc123","queue":"mailers"}"#;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Received = Arc<Mutex<Vec<JsonValue>>>;

/// Stand-in for the target job system; records every job it accepts.
fn mock_target(received: Received) -> Router {
    Router::new()
        .route(
            "/ojs/v1/jobs",
            post(move |Json(body): Json<JsonValue>| {
                let received = Arc::clone(&received);
                async move {
                    received.lock().unwrap().push(body);
                    (AxumStatus::CREATED, Json(json!({"id": "job-123", "state": "available"})))
                }
            }),
        )
        .route("/ojs/v1/health", get(|| async { Json(json!({"status": "ok"})) }))
}

struct Harness {
    proxy: TestServer,
    session: Arc<MigrationSession>,
    received: Received,
    _target: Option<TestServer>,
}

async fn harness(percentage: Option<u32>) -> Harness {
    let received: Received = Arc::default();
    let target = TestServer::spawn(mock_target(Arc::clone(&received))).await;
    let url = target.base_url.clone();
    harness_with_target(percentage, &url, Some(target), received, 1 << 20).await
}

async fn harness_with_target(
    percentage: Option<u32>,
    target_url: &str,
    target: Option<TestServer>,
    received: Received,
    max_body_bytes: usize,
) -> Harness {
    let session = Arc::new(MigrationSession::new(SourceKind::Sidekiq));
    if let Some(pct) = percentage {
        session.start_dual_run(pct).unwrap();
    }
    let client = HttpTargetClient::new(target_url, Duration::from_secs(2)).unwrap();
    let proxy = MigrationProxy::new(Arc::clone(&session), Arc::new(client)).with_max_body_bytes(max_body_bytes);
    let app = jobshift_api::app::build_app(Arc::new(proxy));
    Harness {
        proxy: TestServer::spawn(app).await,
        session,
        received,
        _target: target,
    }
}

/// A url nothing listens on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn post_job(client: &reqwest::Client, base_url: &str, body: &str) -> reqwest::Response {
    client
        .post(format!("{}/jobs", base_url))
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

async fn status(client: &reqwest::Client, base_url: &str) -> JsonValue {
    client
        .get(format!("{}/status", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn routed_job_is_translated_and_target_answer_relayed() {
    let h = harness(Some(100)).await;
    let client = reqwest::Client::new();

    let res = post_job(&client, &h.proxy.base_url, SIDEKIQ_JOB).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-migration-routed"], "target");
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body, json!({"id": "job-123", "state": "available"}));

    let received = h.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["type"], "email.worker");
    assert_eq!(received[0]["args"], json!(["test@example.com"]));
    assert_eq!(received[0]["options"]["queue"], "mailers");

    let stats = h.session.stats().snapshot();
    assert_eq!((stats.routed_to_target, stats.routed_to_legacy, stats.errors), (1, 0, 0));
}

#[tokio::test]
async fn zero_percent_passes_through_untouched() {
    let h = harness(Some(0)).await;
    let client = reqwest::Client::new();

    let res = post_job(&client, &h.proxy.base_url, SIDEKIQ_JOB).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-migration-routed"], "legacy");
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["routed"], "legacy");
    assert_eq!(body["size"], SIDEKIQ_JOB.len());

    // legacy path does no validation
    let res = post_job(&client, &h.proxy.base_url, "not json at all").await;
    assert_eq!(res.status(), StatusCode::OK);

    assert!(h.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn idle_session_routes_everything_to_legacy() {
    let h = harness(None).await;
    let client = reqwest::Client::new();

    let before = status(&client, &h.proxy.base_url).await;
    assert_eq!(before["state"], "idle");
    assert_eq!(before["source"], "sidekiq");

    for _ in 0..5 {
        let res = post_job(&client, &h.proxy.base_url, SIDEKIQ_JOB).await;
        assert_eq!(res.headers()["x-migration-routed"], "legacy");
    }

    let after = status(&client, &h.proxy.base_url).await;
    assert_eq!(after["stats"]["routed_to_legacy"], 5);
    assert_eq!(after["stats"]["routed_to_target"], 0);
}

#[tokio::test]
async fn concurrent_split_accounts_for_every_request() {
    let h = harness(Some(50)).await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for _ in 0..200 {
        let client = client.clone();
        let url = h.proxy.base_url.clone();
        tasks.push(tokio::spawn(async move { post_job(&client, &url, SIDEKIQ_JOB).await.status() }));
    }
    for task in tasks {
        let status = task.await.unwrap();
        assert!(status == StatusCode::OK || status == StatusCode::CREATED);
    }

    let body = status(&client, &h.proxy.base_url).await;
    let target = body["stats"]["routed_to_target"].as_u64().unwrap();
    let legacy = body["stats"]["routed_to_legacy"].as_u64().unwrap();
    assert_eq!(target + legacy, 200);
    assert_eq!(body["stats"]["errors"], 0);
    assert_eq!(h.received.lock().unwrap().len() as u64, target);
}

#[tokio::test]
async fn lifecycle_over_http() {
    let h = harness(None).await;
    let client = reqwest::Client::new();
    let base = &h.proxy.base_url;

    // cutover and rollback are not legal from idle
    let res = client.post(format!("{}/cutover", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "state_conflict");
    let res = client.post(format!("{}/rollback", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // setting a percentage while idle starts the dual run
    let res = client
        .post(format!("{}/percentage", base))
        .json(&json!({"percentage": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["state"], "dual_run");
    assert_eq!(body["percentage"], 10);

    let res = client
        .post(format!("{}/percentage", base))
        .json(&json!({"percentage": 60}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(h.session.percentage(), 60);

    let res = client.post(format!("{}/cutover", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["state"], "cutover");
    assert_eq!(body["percentage"], 100);

    // locked after cutover
    let res = client.post(format!("{}/cutover", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let res = client
        .post(format!("{}/percentage", base))
        .json(&json!({"percentage": 20}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(h.session.percentage(), 100);

    let res = client
        .post(format!("{}/rollback", base))
        .json(&json!({"reason": "error rate spiked"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = status(&client, base).await;
    assert_eq!(body["state"], "rolled_back");
    assert_eq!(body["percentage"], 0);
    assert_eq!(body["rollback_reason"], "error rate spiked");
}

#[tokio::test]
async fn rollback_requires_a_reason() {
    let h = harness(Some(30)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/rollback", h.proxy.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_reason");
    assert_eq!(h.session.rollback_reason(), None);
}

#[tokio::test]
async fn blank_rollback_reason_is_rejected() {
    let h = harness(Some(30)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/rollback", h.proxy.base_url))
        .json(&json!({"reason": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_reason");
    assert_eq!(status(&client, &h.proxy.base_url).await["state"], "dual_run");
}

#[tokio::test]
async fn bad_percentage_requests_are_rejected() {
    let h = harness(Some(30)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/percentage", h.proxy.base_url);

    let res = client.post(&url).json(&json!({"percentage": 150})).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_percentage");

    let res = client.post(&url).json(&json!({"percentage": "half"})).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_body");

    assert_eq!(h.session.percentage(), 30);
}

#[tokio::test]
async fn untranslatable_job_is_a_routed_400() {
    let h = harness(Some(100)).await;
    let client = reqwest::Client::new();

    let res = post_job(&client, &h.proxy.base_url, "not valid json").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["x-migration-routed"], "target");
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "translation_failed");
    assert_eq!(body["routed"], "target");

    assert_eq!(h.session.stats().snapshot().errors, 1);
}

#[tokio::test]
async fn unreachable_target_is_502_without_legacy_fallback() {
    let url = dead_url().await;
    let h = harness_with_target(Some(100), &url, None, Arc::default(), 1 << 20).await;
    let client = reqwest::Client::new();

    let res = post_job(&client, &h.proxy.base_url, SIDEKIQ_JOB).await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()["x-migration-routed"], "target");

    let stats = h.session.stats().snapshot();
    assert_eq!((stats.routed_to_target, stats.routed_to_legacy, stats.errors), (1, 0, 1));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let received: Received = Arc::default();
    let target = TestServer::spawn(mock_target(Arc::clone(&received))).await;
    let url = target.base_url.clone();
    let h = harness_with_target(Some(100), &url, Some(target), received, 64).await;
    let client = reqwest::Client::new();

    let big = format!(r#"{{"class":"Big","args":["{}"]}}"#, "x".repeat(256));
    let res = post_job(&client, &h.proxy.base_url, &big).await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "payload_too_large");

    assert!(h.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_session_and_target() {
    let h = harness(None).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", h.proxy.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "idle");
    assert_eq!(body["percentage"], 0);
    assert_eq!(body["target"]["target_reachable"], true);
}

#[tokio::test]
async fn health_stays_up_when_target_is_down() {
    let url = dead_url().await;
    let h = harness_with_target(Some(40), &url, None, Arc::default(), 1 << 20).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", h.proxy.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "dual_run");
    assert_eq!(body["target"]["target_reachable"], false);
    assert!(body["target"]["target_error"].is_string());
}
