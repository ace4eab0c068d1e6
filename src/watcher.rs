//! Polls a submitted generation job until it resolves.
//!
//! Polls for one job are strictly sequential: the next status query is
//! issued `poll_interval` after the previous one *returned*, so a slow
//! provider never causes a burst of queries. Waiting is done with tokio
//! timers, so concurrent watches share the runtime instead of pinning threads.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::provider::ProviderError;

/// What a single status query reports about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    /// Reference to the produced artifact, usually an image URL.
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// How long a single watch may keep asking.
///
/// The worst case for a job that stays pending is about
/// `max_attempts * poll_interval` (60 s with the defaults).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Consecutive transport errors tolerated within one poll slot.
    /// Zero surfaces the first error.
    pub transport_retries: u32,
}

impl Default for AttemptBudget {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            poll_interval: Duration::from_secs(1),
            transport_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobWatcher {
    budget: AttemptBudget,
}

impl JobWatcher {
    pub fn new(budget: AttemptBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> AttemptBudget {
        self.budget
    }

    /// Poll `status_fn` for `job_id` until it succeeds, fails, the attempt
    /// budget runs out, or `cancel` fires.
    pub async fn watch<F, Fut>(
        &self,
        job_id: &str,
        mut status_fn: F,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<JobStatus, ProviderError>>,
    {
        let budget = self.budget;
        let mut state = JobState::Submitted;
        let mut attempts: u32 = 0;

        if budget.max_attempts == 0 {
            transition(job_id, &mut state, JobState::TimedOut);
            return Err(GatewayError::WatchTimedOut { attempts });
        }

        loop {
            if cancel.is_cancelled() {
                transition(job_id, &mut state, JobState::Cancelled);
                return Err(GatewayError::Cancelled);
            }

            transition(job_id, &mut state, JobState::Polling);
            attempts += 1;

            let status = match self.poll_slot(job_id, attempts, &mut status_fn, cancel).await {
                Ok(status) => status,
                Err(GatewayError::Cancelled) => {
                    transition(job_id, &mut state, JobState::Cancelled);
                    return Err(GatewayError::Cancelled);
                }
                Err(err) => {
                    transition(job_id, &mut state, JobState::Failed);
                    return Err(err);
                }
            };

            match status {
                JobStatus::Succeeded(artifact) => {
                    transition(job_id, &mut state, JobState::Succeeded);
                    tracing::info!(job_id, attempts, "Job succeeded");
                    return Ok(artifact);
                }
                JobStatus::Failed(message) => {
                    transition(job_id, &mut state, JobState::Failed);
                    tracing::warn!(job_id, attempts, error = %message, "Job failed");
                    return Err(GatewayError::ProviderFailed(message));
                }
                JobStatus::Pending if attempts >= budget.max_attempts => {
                    transition(job_id, &mut state, JobState::TimedOut);
                    tracing::warn!(job_id, attempts, "Job still pending, giving up");
                    return Err(GatewayError::WatchTimedOut { attempts });
                }
                JobStatus::Pending => {
                    if !pause(budget.poll_interval, cancel).await {
                        transition(job_id, &mut state, JobState::Cancelled);
                        return Err(GatewayError::Cancelled);
                    }
                }
            }
        }
    }

    // One counted attempt, absorbing up to `transport_retries` transport errors.
    async fn poll_slot<F, Fut>(
        &self,
        job_id: &str,
        attempt: u32,
        status_fn: &mut F,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, GatewayError>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<JobStatus, ProviderError>>,
    {
        let mut transport_errors: u32 = 0;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                result = status_fn(job_id) => result,
            };

            match result {
                Ok(status) => return Ok(status),
                Err(err) if transport_errors < self.budget.transport_retries => {
                    transport_errors += 1;
                    tracing::warn!(
                        job_id,
                        attempt,
                        retry = transport_errors,
                        error = %err,
                        "Status query failed, retrying",
                    );
                    if !pause(self.budget.poll_interval, cancel).await {
                        return Err(GatewayError::Cancelled);
                    }
                }
                Err(err) => {
                    tracing::error!(job_id, attempt, error = %err, "Status query failed, giving up");
                    return Err(GatewayError::Provider(err));
                }
            }
        }
    }
}

// Sleep unless cancelled first; false means cancelled.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn transition(job_id: &str, state: &mut JobState, next: JobState) {
    if *state != next {
        tracing::debug!(job_id, from = ?*state, to = ?next, "Job state changed");
        *state = next;
    }
}
