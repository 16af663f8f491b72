use crate::cancel::CancelToken;
use crate::error::ApiError;
use crate::status::{StatusSnapshot, TaskStatus};
use crate::upload::TaskId;
use async_trait::async_trait;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const POLL_CEILING: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            ceiling: POLL_CEILING,
        }
    }
}

impl PollPolicy {
    pub fn expired(&self, started_at: Duration, now: Duration) -> bool {
        now.saturating_sub(started_at) > self.ceiling
    }
}

#[async_trait(?Send)]
pub trait StatusSource {
    async fn status(&self, task: &TaskId) -> Result<StatusSnapshot, ApiError>;
}

/// Time source for the poll loop. `now` only has to be monotonic relative
/// to the `started_at` the caller passes in.
#[async_trait(?Send)]
pub trait Clock {
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Polls `task` until it reaches a terminal state.
///
/// Every snapshot is handed to `on_snapshot` exactly as received. The
/// ceiling is measured from `started_at` and checked before each request,
/// so once it trips no further request is issued. Both the status request
/// and the delay between polls run under `token`.
pub async fn poll_until_terminal<S, C, F>(
    source: &S,
    clock: &C,
    task: &TaskId,
    policy: &PollPolicy,
    started_at: Duration,
    token: &CancelToken,
    mut on_snapshot: F,
) -> Result<StatusSnapshot, ApiError>
where
    S: StatusSource + ?Sized,
    C: Clock + ?Sized,
    F: FnMut(&StatusSnapshot),
{
    let mut polls = 0u32;

    loop {
        if policy.expired(started_at, clock.now()) {
            log::warn!("Task {} timed out after {} polls", task, polls);
            return Err(ApiError::Timeout(policy.ceiling));
        }

        let snapshot = token.run(source.status(task)).await??;
        polls += 1;
        log::debug!(
            "Task {} poll #{}: {} {}%",
            task,
            polls,
            snapshot.status,
            snapshot.progress
        );
        on_snapshot(&snapshot);

        match snapshot.status {
            TaskStatus::Completed => return Ok(snapshot),
            TaskStatus::Failed => return Err(ApiError::TaskFailed(snapshot.message)),
            TaskStatus::Cancelled => return Err(ApiError::Cancelled),
            TaskStatus::Pending
            | TaskStatus::Queued
            | TaskStatus::Processing
            | TaskStatus::Unknown => {
                token.run(clock.sleep(policy.interval)).await?;
            }
        }
    }
}
