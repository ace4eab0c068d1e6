use std::time::Duration;

use clap::Parser;

use crate::rate_limit::WindowConfig;
use crate::watcher::AttemptBudget;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "stylizer-gateway")]
#[command(about = "Rate-limited gateway for photo personalization jobs")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Base URL of the predictions API
    #[arg(long, env = "REPLICATE_API_URL", default_value = "https://api.replicate.com/v1")]
    pub provider_url: String,

    // Without a token the personalize route answers 503
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub provider_token: Option<String>,

    // Model version used for every prediction
    #[arg(long, env = "REPLICATE_MODEL_VERSION", default_value = "latest-instantid-version")]
    pub model_version: String,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 15 * 60)]
    pub rate_window: u64,

    // Limiter sweep interval in seconds (defaults to twice the window)
    #[arg(long)]
    pub cleanup_interval: Option<u64>,

    // Status checks before a job counts as timed out
    #[arg(long, default_value_t = 60)]
    pub max_attempts: u32,

    // Delay between status checks in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    // Transport errors retried within a single status check (0 = fail fast)
    #[arg(long, default_value_t = 2)]
    pub transport_retries: u32,

    // Largest accepted photo after base64 decoding
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_photo_bytes: usize,
}

impl Args {
    pub fn window(&self) -> WindowConfig {
        WindowConfig::new(Duration::from_secs(self.rate_window), self.rate_limit)
    }

    pub fn cleanup_every(&self) -> Duration {
        match self.cleanup_interval {
            Some(secs) => Duration::from_secs(secs.max(1)),
            None => Duration::from_secs((self.rate_window * 2).max(1)),
        }
    }

    pub fn attempt_budget(&self) -> AttemptBudget {
        AttemptBudget {
            max_attempts: self.max_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            transport_retries: self.transport_retries,
        }
    }
}
