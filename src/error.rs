use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::provider::ProviderError;

/// Every outcome a personalization request can end in besides success.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds.")]
    AdmissionDenied { retry_after_secs: u64 },

    /// The provider reported the job as failed. The message is passed through verbatim.
    #[error("Generation failed: {0}")]
    ProviderFailed(String),

    #[error("Generation did not finish after {attempts} status checks")]
    WatchTimedOut { attempts: u32 },

    #[error("Provider unreachable: {0}")]
    Provider(#[from] ProviderError),

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No image generation provider configured")]
    NotConfigured,
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AdmissionDenied { .. } => "RATE_LIMITED",
            GatewayError::ProviderFailed(_) => "PROVIDER_FAILED",
            GatewayError::WatchTimedOut { .. } => "TIMED_OUT",
            GatewayError::Provider(_) => "PROVIDER_ERROR",
            GatewayError::Cancelled => "CANCELLED",
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::NotConfigured => "NOT_CONFIGURED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionDenied { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ProviderFailed(_) | GatewayError::Provider(_) => StatusCode::BAD_GATEWAY,
            GatewayError::WatchTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Cancelled | GatewayError::NotConfigured => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Personalization request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        let mut response = (status, body).into_response();

        if let GatewayError::AdmissionDenied { retry_after_secs } = self {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
        }

        response
    }
}
