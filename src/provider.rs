//! Client for the hosted image-generation service.
//!
//! Jobs are submitted as Replicate-style predictions and later queried by
//! id; [`ImageProvider::status`] is what the job watcher polls.

use async_trait::async_trait;
use serde::Deserialize;

use crate::watcher::JobStatus;

// Fixed generation parameters for face-consistent styling
const STYLE_STRENGTH: f32 = 0.8;
const IDENTITY_STRENGTH: f32 = 0.9;
const NEGATIVE_PROMPT: &str = "realistic, photographic, blurry, low quality";

/// Errors talking to the provider, as opposed to the provider reporting a failed job.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected provider response: {0}")]
    Malformed(String),
}

/// Everything the provider needs to start one generation.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// Source photo as a data URL.
    pub photo: String,
    pub prompt: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Start a job and return its provider-assigned id.
    async fn submit(&self, job: &GenerationJob) -> Result<String, ProviderError>;

    /// Report the job's current state. Safe to call repeatedly.
    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError>;
}

pub struct ReplicateProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model_version: String,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ReplicateProvider {
    pub fn new(client: reqwest::Client, base_url: &str, token: String, model_version: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            model_version,
        }
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<Prediction, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Prediction>().await?)
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    async fn submit(&self, job: &GenerationJob) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "version": self.model_version,
            "input": {
                "image": job.photo,
                "prompt": job.prompt,
                "negative_prompt": NEGATIVE_PROMPT,
                "style_strength": STYLE_STRENGTH,
                "identity_strength": IDENTITY_STRENGTH,
            },
        });

        let response = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;

        let prediction = Self::parse_prediction(response).await?;
        if prediction.id.is_empty() {
            return Err(ProviderError::Malformed("prediction has no id".into()));
        }
        tracing::info!(job_id = %prediction.id, "Prediction submitted");
        Ok(prediction.id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, job_id))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        let prediction = Self::parse_prediction(response).await?;
        interpret(&prediction)
    }
}

/// Map a prediction document onto the watcher's view of a job.
pub fn interpret(prediction: &Prediction) -> Result<JobStatus, ProviderError> {
    match prediction.status.as_str() {
        "starting" | "processing" => Ok(JobStatus::Pending),
        "succeeded" => Ok(match first_output(prediction.output.as_ref()) {
            Some(url) => JobStatus::Succeeded(url),
            None => JobStatus::Failed("prediction succeeded without output".into()),
        }),
        "failed" | "canceled" => {
            let message = match &prediction.error {
                Some(serde_json::Value::String(msg)) if !msg.is_empty() => msg.clone(),
                Some(serde_json::Value::Null) | None => prediction.status.clone(),
                Some(other) => other.to_string(),
            };
            Ok(JobStatus::Failed(message))
        }
        other => Err(ProviderError::Malformed(format!("unknown prediction status '{other}'"))),
    }
}

// output is either a list of URLs or a single URL
fn first_output(output: Option<&serde_json::Value>) -> Option<String> {
    match output? {
        serde_json::Value::String(url) if !url.is_empty() => Some(url.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(|item| match item {
            serde_json::Value::String(url) if !url.is_empty() => Some(url.clone()),
            _ => None,
        }),
        _ => None,
    }
}
