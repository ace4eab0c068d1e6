//! End-to-end tests for the personalization route.
//!
//! Uses Axum's tower::ServiceExt to send requests directly to the router,
//! with a scripted provider standing in for the hosted service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use stylizer_gateway::provider::{GenerationJob, ImageProvider, ProviderError};
use stylizer_gateway::rate_limit::{AdmissionLimiter, WindowConfig};
use stylizer_gateway::state::AppState;
use stylizer_gateway::watcher::{AttemptBudget, JobStatus, JobWatcher};

const PHOTO: &str = "data:image/png;base64,iVBORw0KGgo=";

#[derive(Default)]
struct ScriptedProvider {
    statuses: Mutex<VecDeque<Result<JobStatus, ProviderError>>>,
    submitted: Mutex<Vec<GenerationJob>>,
    polls: Mutex<u32>,
}

impl ScriptedProvider {
    fn new(statuses: Vec<Result<JobStatus, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        })
    }

    fn polls(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    async fn submit(&self, job: &GenerationJob) -> Result<String, ProviderError> {
        self.submitted.lock().unwrap().push(job.clone());
        Ok("pred-123".into())
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        assert_eq!(job_id, "pred-123");
        *self.polls.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobStatus::Pending))
    }
}

fn build_app(provider: Option<Arc<ScriptedProvider>>, max_requests: u32) -> (Router, CancellationToken) {
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        limiter: Arc::new(AdmissionLimiter::new(WindowConfig::new(
            Duration::from_secs(900),
            max_requests,
        ))),
        watcher: JobWatcher::new(AttemptBudget {
            max_attempts: 5,
            poll_interval: Duration::from_secs(1),
            transport_retries: 1,
        }),
        provider: provider.map(|p| p as Arc<dyn ImageProvider>),
        max_photo_bytes: 1024,
        shutdown: shutdown.clone(),
    });
    (stylizer_gateway::app(state), shutdown)
}

fn personalize(client: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/personalize")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn valid_body() -> serde_json::Value {
    serde_json::json!({ "photo": PHOTO, "illustration": "superhero" })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn successful_job_returns_result_url() {
    let provider = ScriptedProvider::new(vec![
        Ok(JobStatus::Pending),
        Ok(JobStatus::Succeeded("https://cdn.example/hero.png".into())),
    ]);
    let (app, _) = build_app(Some(Arc::clone(&provider)), 10);

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "9");
    let json = body_json(response).await;
    assert_eq!(json["resultUrl"], "https://cdn.example/hero.png");
    assert_eq!(json["jobId"], "pred-123");

    assert_eq!(provider.polls(), 2);
    let submitted = provider.submitted.lock().unwrap();
    assert_eq!(submitted[0].photo, PHOTO);
    assert!(submitted[0].prompt.contains("superhero illustration"));
}

#[tokio::test(start_paused = true)]
async fn request_over_quota_is_rate_limited() {
    let provider = ScriptedProvider::new(Vec::new());
    let (app, _) = build_app(Some(provider), 1);

    let first = app
        .clone()
        .oneshot(personalize("203.0.113.7", serde_json::json!({ "photo": "nope", "illustration": "x" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = app.clone().oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
    assert_eq!(body_json(second).await["code"], "RATE_LIMITED");

    // a different caller still has its own quota
    let other = app
        .oneshot(personalize("198.51.100.4", serde_json::json!({ "photo": "nope", "illustration": "x" })))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn provider_failure_is_surfaced() {
    let provider = ScriptedProvider::new(vec![
        Ok(JobStatus::Pending),
        Ok(JobStatus::Failed("face not detected".into())),
    ]);
    let (app, _) = build_app(Some(Arc::clone(&provider)), 10);

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PROVIDER_FAILED");
    assert_eq!(json["error"], "Generation failed: face not detected");
    assert_eq!(provider.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn pending_job_times_out_after_budget() {
    let provider = ScriptedProvider::new(Vec::new());
    let (app, _) = build_app(Some(Arc::clone(&provider)), 10);

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["code"], "TIMED_OUT");
    assert_eq!(provider.polls(), 5);
}

#[tokio::test(start_paused = true)]
async fn repeated_transport_errors_become_provider_error() {
    let blip = || ProviderError::Malformed("truncated body".into());
    let provider = ScriptedProvider::new(vec![Err(blip()), Err(blip())]);
    let (app, _) = build_app(Some(Arc::clone(&provider)), 10);

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "PROVIDER_ERROR");
    assert_eq!(provider.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_watch() {
    let provider = ScriptedProvider::new(Vec::new());
    let (app, shutdown) = build_app(Some(Arc::clone(&provider)), 10);

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        trigger.cancel();
    });

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "CANCELLED");
    assert_eq!(provider.polls(), 2);
}

#[tokio::test]
async fn missing_provider_is_reported() {
    let (app, _) = build_app(None, 10);

    let response = app.oneshot(personalize("203.0.113.7", valid_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "NOT_CONFIGURED");
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = build_app(None, 10);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn metrics_are_exposed() {
    let (app, _) = build_app(None, 10);
    // make sure at least one request counter has been touched
    let _ = app.clone().oneshot(personalize("203.0.113.9", valid_body())).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("stylizer_requests_total"));
}
