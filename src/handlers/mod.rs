mod health;
mod metrics;
mod personalize;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use personalize::{ClientId, personalize_handler};
