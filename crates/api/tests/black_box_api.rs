use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use deferred_api::app::{self, AppServices, HandlerRegistration, handlers};
use deferred_api::config::ServiceConfig;
use deferred_core::JobFailure;
use reqwest::StatusCode;
use serde_json::json;

const TOKEN: &str = "test-token";

/// Gate shared with the `people.list` handler; jobs block until it opens.
#[derive(Clone, Default)]
struct Gate(Arc<AtomicBool>);

impl Gate {
    fn open(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn wait(&self) {
        while !self.0.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    services: Arc<AppServices>,
    gate: Gate,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ServiceConfig::default()).await
    }

    /// Server with the same handlers as the service binary.
    async fn spawn_builtin(config: ServiceConfig) -> Self {
        Self::start(config, Box::new(handlers::register_builtin), Gate::default()).await
    }

    async fn spawn_with(config: ServiceConfig) -> Self {
        let gate = Gate::default();
        let handler_gate = gate.clone();
        let register: HandlerRegistration = Box::new(move |executor| {
            executor.register_handler("people.list", move |job| {
                handler_gate.wait();
                if job.payload == json!("list-people") {
                    Ok(json!([{ "name": "A" }]))
                } else {
                    Err(JobFailure::new("invalid filter"))
                }
            });
        });
        Self::start(config, register, gate).await
    }

    async fn start(config: ServiceConfig, register: HandlerRegistration, gate: Gate) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let (router, services) = app::build_app(&config, register).expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url,
            handle,
            services,
            gate,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Never leave a worker parked on the gate.
        self.gate.open();
        self.handle.abort();
        self.services.shutdown();
    }
}

async fn submit(client: &reqwest::Client, srv: &TestServer, body: serde_json::Value) -> String {
    let res = client
        .post(srv.url("/jobs"))
        .bearer_auth(TOKEN)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "PENDING");
    body["requestId"].as_str().unwrap().to_string()
}

async fn poll(client: &reqwest::Client, srv: &TestServer, id: &str) -> (StatusCode, serde_json::Value) {
    let res = client
        .get(srv.url(&format!("/jobs/{id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

async fn poll_until_terminal(
    client: &reqwest::Client,
    srv: &TestServer,
    id: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let (status, body) = poll(client, srv, id).await;
        if status == StatusCode::OK {
            return body;
        }
        assert_eq!(status, StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("job {id} did not reach a terminal state within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_job_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/jobs"))
        .json(&json!({ "payload": "list-people" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/jobs/stats"))
        .bearer_auth(" ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Any non-blank bearer token is enough to reach the handlers.
    let res = client
        .get(srv.url("/jobs/stats"))
        .bearer_auth("another-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_poll_delete_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(
        &client,
        &srv,
        json!({ "kind": "people.list", "payload": "list-people" }),
    )
    .await;

    // Still gated: every poll reports PENDING.
    for _ in 0..2 {
        let (status, body) = poll(&client, &srv, &id).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["requestId"], id.as_str());
    }

    srv.gate.open();
    let body = poll_until_terminal(&client, &srv, &id).await;
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["data"], json!([{ "name": "A" }]));

    // Terminal results are stable across reads.
    let (status, again) = poll(&client, &srv, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, body);

    let res = client
        .delete(srv.url(&format!("/jobs/{id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let deleted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(deleted["removed"], true);

    let (status, body) = poll(&client, &srv, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn kindless_submission_runs_on_builtin_handlers() {
    let config = ServiceConfig {
        workers: 1,
        ..ServiceConfig::default()
    };
    let srv = TestServer::spawn_builtin(config).await;
    let client = reqwest::Client::new();

    // Occupy the single worker so the next job is observably pending.
    submit(&client, &srv, json!({ "kind": "sleep", "payload": { "ms": 300 } })).await;
    let id = submit(&client, &srv, json!({ "payload": "list-people" })).await;

    let (status, body) = poll(&client, &srv, &id).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");

    let body = poll_until_terminal(&client, &srv, &id).await;
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["data"], "list-people");

    let res = client
        .delete(srv.url(&format!("/jobs/{id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, _) = poll(&client, &srv, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_use_camel_case_keys() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let stats: serde_json::Value = client
        .get(srv.url("/jobs/stats"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["executor"]["workers"], 4);
    assert!(stats["executor"]["jobsProcessed"].is_number());
    assert!(stats["executor"]["writeFailures"].is_number());
    assert!(stats["executor"].get("jobs_processed").is_none());
    assert_eq!(stats["queue"]["capacity"], 1024);
}

#[tokio::test]
async fn domain_failure_is_reported_as_error_result() {
    let srv = TestServer::spawn().await;
    srv.gate.open();
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({ "kind": "people.list", "payload": "bogus" })).await;

    let body = poll_until_terminal(&client, &srv, &id).await;
    assert_eq!(body["status"], "ERROR");
    assert_eq!(body["message"], "invalid filter");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn unknown_kind_fails_without_crashing_workers() {
    let srv = TestServer::spawn().await;
    srv.gate.open();
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({ "kind": "reports.build", "payload": {} })).await;
    let body = poll_until_terminal(&client, &srv, &id).await;
    assert_eq!(body["status"], "ERROR");
    assert_eq!(body["message"], "no handler for job kind: reports.build");

    let id = submit(&client, &srv, json!({ "kind": "people.list", "payload": "list-people" })).await;
    let body = poll_until_terminal(&client, &srv, &id).await;
    assert_eq!(body["status"], "SUCCESS");
}

#[tokio::test]
async fn delete_is_idempotent_and_unknown_ids_are_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for id in ["abc123", "0190a5a0-0000-7000-8000-000000000000"] {
        let (status, _) = poll(&client, &srv, id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let res = client
                .delete(srv.url(&format!("/jobs/{id}/result")))
                .bearer_auth(TOKEN)
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let body: serde_json::Value = res.json().await.unwrap();
            assert_eq!(body["removed"], false);
            assert_eq!(body["requestId"], id);
        }
    }
}

#[tokio::test]
async fn exists_tracks_the_record() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({ "kind": "people.list", "payload": "list-people" })).await;

    let exists = |id: String| {
        let client = client.clone();
        let url = srv.url(&format!("/jobs/{id}/exists"));
        async move {
            let body: serde_json::Value = client
                .get(url)
                .bearer_auth(TOKEN)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["exists"].as_bool().unwrap()
        }
    };

    assert!(exists(id.clone()).await);
    assert!(!exists("abc123".to_string()).await);

    srv.gate.open();
    poll_until_terminal(&client, &srv, &id).await;
    client
        .delete(srv.url(&format!("/jobs/{id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert!(!exists(id).await);
}

#[tokio::test]
async fn withdraw_only_affects_jobs_not_yet_started() {
    let config = ServiceConfig {
        workers: 1,
        ..ServiceConfig::default()
    };
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    let running = submit(&client, &srv, json!({ "kind": "people.list", "payload": "list-people" })).await;
    let queued = submit(&client, &srv, json!({ "kind": "people.list", "payload": "list-people" })).await;

    // Wait for the single worker to pick up the first job.
    let mut started = false;
    for _ in 0..200 {
        let stats: serde_json::Value = client
            .get(srv.url("/jobs/stats"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if stats["executor"]["currentRunning"] == 1 {
            started = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(started, "worker never picked up the first job");

    let withdraw = |id: String| {
        let client = client.clone();
        let url = srv.url(&format!("/jobs/{id}/withdraw"));
        async move {
            let body: serde_json::Value = client
                .post(url)
                .bearer_auth(TOKEN)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["outcome"].as_str().unwrap().to_string()
        }
    };

    assert_eq!(withdraw(queued.clone()).await, "withdrawn");
    assert_eq!(withdraw(running.clone()).await, "already_started");
    assert_eq!(withdraw("abc123".to_string()).await, "not_found");

    let (status, body) = poll(&client, &srv, &queued).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ERROR");
    assert_eq!(body["message"], "withdrawn before execution");

    srv.gate.open();
    let body = poll_until_terminal(&client, &srv, &running).await;
    assert_eq!(body["status"], "SUCCESS");
}

#[tokio::test]
async fn full_queue_rejects_submission() {
    let config = ServiceConfig {
        workers: 1,
        queue_capacity: 1,
        ..ServiceConfig::default()
    };
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    // One job held by the worker, at most one waiting; the rest must bounce.
    let mut rejected = None;
    for _ in 0..4 {
        let res = client
            .post(srv.url("/jobs"))
            .bearer_auth(TOKEN)
            .json(&json!({ "kind": "people.list", "payload": "list-people" }))
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::SERVICE_UNAVAILABLE {
            rejected = Some(res.json::<serde_json::Value>().await.unwrap());
            break;
        }
        assert_eq!(res.status(), StatusCode::OK);
    }

    let body = rejected.expect("queue never rejected a submission");
    assert_eq!(body["error"], "submission_rejected");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/jobs"))
        .bearer_auth(TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/jobs"))
        .bearer_auth(TOKEN)
        .json(&json!({ "kind": "   ", "payload": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn extend_retention_requires_positive_seconds() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = submit(&client, &srv, json!({ "kind": "people.list", "payload": "list-people" })).await;

    let res = client
        .post(srv.url(&format!("/jobs/{id}/extend")))
        .bearer_auth(TOKEN)
        .json(&json!({ "seconds": 600 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["extended"], true);

    let res = client
        .post(srv.url(&format!("/jobs/{id}/extend")))
        .bearer_auth(TOKEN)
        .json(&json!({ "seconds": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
