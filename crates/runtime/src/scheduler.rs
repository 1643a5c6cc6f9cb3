//! Periodic job scheduling.
//!
//! Each job runs as a supervised single-instance task ticking at its
//! period; the first tick fires one period after scheduling. Pausing
//! the scheduler stops every job at its next tick boundary, which is
//! how shutdown guarantees no new jobs start.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::AgentError;
use crate::supervisor::Supervisor;

type JobFn = Arc<
    dyn Fn(u64) -> Pin<Box<dyn Future<Output = Result<(), AgentError>> + Send>> + Send + Sync,
>;

pub(crate) struct Scheduler {
    cancel: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    /// Starts a periodic job named `job-<name>`.
    ///
    /// The job receives a 1-based tick count. A job returning an error
    /// is fatal, like any supervised task.
    pub(crate) fn schedule<F, Fut>(
        &self,
        supervisor: &Supervisor,
        name: &str,
        period: Duration,
        job: F,
    ) -> Result<(), AgentError>
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let job: JobFn = Arc::new(move |count| Box::pin(job(count)));
        let cancel = self.cancel.clone();
        let job_name = format!("job-{name}");
        let tick_name = name.to_owned();

        supervisor.spawn(&job_name, true, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // consume the immediate first tick
            let mut count: u64 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = interval.tick() => {
                        count += 1;
                        trace!(job = %tick_name, count, "job tick");
                        job(count).await?;
                    }
                }
            }
        })?;
        Ok(())
    }

    /// Stops every job; scheduled tasks exit at their next wakeup.
    pub(crate) fn pause(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
