//! Sliding-window admission limiter, keyed by caller identifier.
//!
//! Each identifier keeps the instants of its admitted requests that are
//! still inside the trailing window. Expired instants are dropped lazily
//! whenever an identifier is touched, so correctness never depends on
//! [`AdmissionLimiter::cleanup`] running. The background sweep only keeps
//! abandoned identifiers from piling up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::error::GatewayError;
use crate::metrics::TRACKED_CLIENTS;

/// Window shape, fixed for the limiter's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub interval: Duration,
    pub max_requests: u32,
}

impl WindowConfig {
    pub fn new(interval: Duration, max_requests: u32) -> Self {
        Self {
            interval,
            max_requests,
        }
    }
}

impl Default for WindowConfig {
    // 10 requests per 15 minutes
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60), 10)
    }
}

/// Result of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

pub struct AdmissionLimiter<C: Clock = SystemClock> {
    config: WindowConfig,
    // DashMap shards its locks, so unrelated identifiers rarely contend
    windows: DashMap<String, Vec<Instant>>,
    clock: C,
}

impl AdmissionLimiter<SystemClock> {
    pub fn new(config: WindowConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> AdmissionLimiter<C> {
    pub fn with_clock(config: WindowConfig, clock: C) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Returns true and records the request if `identifier` is under quota.
    pub fn check(&self, identifier: &str) -> bool {
        matches!(self.decide(identifier), Decision::Allowed { .. })
    }

    /// Like [`check`](Self::check), but reports the quota left after this
    /// request, or how long until the oldest recorded request expires.
    pub fn admit(&self, identifier: &str) -> Result<u32, GatewayError> {
        match self.decide(identifier) {
            Decision::Allowed { remaining } => Ok(remaining),
            Decision::Denied { retry_after } => {
                // round up so the client never retries a moment too early
                let mut secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    secs += 1;
                }
                Err(GatewayError::AdmissionDenied {
                    retry_after_secs: secs.max(1),
                })
            }
        }
    }

    pub fn decide(&self, identifier: &str) -> Decision {
        if self.config.max_requests == 0 {
            return Decision::Denied {
                retry_after: self.config.interval,
            };
        }

        let now = self.clock.now();
        let interval = self.config.interval;
        let limit = self.config.max_requests as usize;

        // the entry guard holds the shard lock from filter through append
        let mut entry = self.windows.entry(identifier.to_string()).or_default();
        let timestamps = entry.value_mut();
        timestamps.retain(|t| now.duration_since(*t) < interval);

        if timestamps.len() >= limit {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = (oldest + interval).saturating_duration_since(now);
            tracing::debug!(identifier, ?retry_after, "Admission denied");
            return Decision::Denied { retry_after };
        }

        timestamps.push(now);
        Decision::Allowed {
            remaining: (limit - timestamps.len()) as u32,
        }
    }

    /// Requests `identifier` may still make in the current window.
    pub fn remaining(&self, identifier: &str) -> u32 {
        let max = self.config.max_requests;
        if max == 0 {
            return 0;
        }

        let now = self.clock.now();
        let interval = self.config.interval;
        match self.windows.get_mut(identifier) {
            Some(mut timestamps) => {
                timestamps.retain(|t| now.duration_since(*t) < interval);
                max.saturating_sub(timestamps.len() as u32)
            }
            None => max,
        }
    }

    /// Forget everything recorded for `identifier`.
    pub fn reset(&self, identifier: &str) {
        if self.windows.remove(identifier).is_some() {
            tracing::info!(identifier, "Admission history reset");
        }
    }

    /// Drop expired instants everywhere and remove identifiers left empty.
    ///
    /// Returns how many identifiers were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let interval = self.config.interval;
        let before = self.windows.len();

        self.windows.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < interval);
            !timestamps.is_empty()
        });

        before.saturating_sub(self.windows.len())
    }

    /// Number of identifiers currently held in memory.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Sweep `limiter` every `every` until `cancel` fires.
///
/// Spawned by the process composition; the limiter never starts its own timer.
pub async fn cleanup_loop<C: Clock>(
    limiter: Arc<AdmissionLimiter<C>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    // the first tick fires immediately and there is nothing to sweep yet
    interval.tick().await;

    tracing::info!(interval_secs = every.as_secs(), "Admission cleanup started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Admission cleanup stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = limiter.cleanup();
                let tracked = limiter.tracked();
                TRACKED_CLIENTS.set(tracked as f64);
                if removed > 0 {
                    tracing::info!(removed, tracked, "Admission cleanup: dropped idle identifiers");
                } else {
                    tracing::debug!(tracked, "Admission cleanup: nothing to drop");
                }
            }
        }
    }
}
