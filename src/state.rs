use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::provider::ImageProvider;
use crate::rate_limit::AdmissionLimiter;
use crate::watcher::JobWatcher;

// app's shared state
pub struct AppState {
    pub limiter: Arc<AdmissionLimiter>,
    pub watcher: JobWatcher,
    pub provider: Option<Arc<dyn ImageProvider>>, // None until a token is configured
    pub max_photo_bytes: usize,
    pub shutdown: CancellationToken, // parent of every in-flight watch
}
