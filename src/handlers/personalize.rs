use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::GatewayError;
use crate::metrics::{ADMISSIONS_DENIED, JOB_OUTCOMES, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{PersonalizeRequest, PersonalizeResponse};
use crate::provider::GenerationJob;
use crate::state::AppState;
use crate::styles::build_prompt;

/// Who the rate limiter counts a request against.
///
/// First hop of `X-Forwarded-For` when behind a proxy, otherwise the peer
/// address, otherwise `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return Ok(ClientId(ip.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(ClientId(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}

pub async fn personalize_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Json(payload): Json<PersonalizeRequest>,
) -> Result<Response, GatewayError> {
    REQUEST_TOTAL.inc();

    let remaining = state.limiter.admit(&client).inspect_err(|_| {
        ADMISSIONS_DENIED.inc();
        tracing::info!(identifier = %client, "Rate limit exceeded");
    })?;

    payload.validate(state.max_photo_bytes)?;
    let provider = state.provider.clone().ok_or(GatewayError::NotConfigured)?;

    let start_time = Instant::now();
    tracing::info!(identifier = %client, style = %payload.illustration, "Starting personalization");

    let job = GenerationJob {
        photo: payload.photo,
        prompt: build_prompt(&payload.illustration),
    };
    let job_id = provider.submit(&job).await?;

    // a dropped request drops this future; shutdown cancels the token
    let cancel = state.shutdown.child_token();
    let outcome = state
        .watcher
        .watch(
            &job_id,
            |id| {
                let provider = Arc::clone(&provider);
                let id = id.to_owned();
                async move { provider.status(&id).await }
            },
            &cancel,
        )
        .await;

    JOB_OUTCOMES.with_label_values(&[outcome_label(&outcome)]).inc();
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let result_url = outcome?;
    let mut response = Json(PersonalizeResponse { result_url, job_id }).into_response();
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    Ok(response)
}

fn outcome_label(outcome: &Result<String, GatewayError>) -> &'static str {
    match outcome {
        Ok(_) => "succeeded",
        Err(GatewayError::ProviderFailed(_)) => "failed",
        Err(GatewayError::WatchTimedOut { .. }) => "timed_out",
        Err(GatewayError::Cancelled) => "cancelled",
        Err(_) => "provider_error",
    }
}
