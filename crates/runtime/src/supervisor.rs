//! Background task supervision.
//!
//! Every runtime task (loops, scheduler jobs, handler invocations,
//! user spawns) is tracked by name. Single-instance names must be
//! free at spawn time; other names get a random six-character suffix.
//! A task returning an error is fatal and trips the shutdown trigger;
//! cancellation is silent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::AgentError;

pub(crate) struct Supervisor {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    shutdown: CancellationToken,
}

fn random_suffix(len: usize) -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl Supervisor {
    /// `shutdown` is tripped when a supervised task fails.
    pub(crate) fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Spawns and tracks a task. Returns the tracked name.
    pub(crate) fn spawn<F>(
        &self,
        name: &str,
        single: bool,
        fut: F,
    ) -> Result<String, AgentError>
    where
        F: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap();
        let task_name = if single {
            if tasks.contains_key(name) {
                return Err(AgentError::TaskAlreadyRunning(name.to_owned()));
            }
            name.to_owned()
        } else {
            let mut candidate = format!("{name}-{}", random_suffix(6));
            while tasks.contains_key(&candidate) {
                candidate = format!("{name}-{}", random_suffix(6));
            }
            candidate
        };

        let tracked = task_name.clone();
        let tasks_ref = self.tasks.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(()) => trace!(task = %tracked, "task finished"),
                Err(e) => {
                    error!(task = %tracked, error = %e, "task failed, stopping agent");
                    shutdown.cancel();
                }
            }
            tasks_ref.lock().unwrap().remove(&tracked);
        });
        tasks.insert(task_name.clone(), handle);
        Ok(task_name)
    }

    /// Aborts one tracked task, if present.
    pub(crate) fn cancel(&self, name: &str) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(name) {
            debug!(task = %name, "cancelling task");
            handle.abort();
        }
    }

    /// Aborts every tracked task and awaits completion, bounded by
    /// `grace` per task.
    pub(crate) async fn cancel_all(&self, grace: Duration) {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.tasks.lock().unwrap().drain().collect();
        for (name, handle) in &handles {
            trace!(task = %name, "cancelling task");
            handle.abort();
        }
        for (name, handle) in handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!(task = %name, error = %e, "task ended abnormally"),
                Err(_) => warn!(task = %name, "task did not stop within grace period"),
            }
        }
    }

    /// Names of the currently running tasks, sorted.
    pub(crate) fn inventory(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn is_running(&self, name: &str) -> bool {
        self.tasks.lock().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn supervisor() -> (Supervisor, CancellationToken) {
        let token = CancellationToken::new();
        (Supervisor::new(token.clone()), token)
    }

    #[tokio::test]
    async fn completed_tasks_are_removed() {
        let (sup, _token) = supervisor();
        let name = sup
            .spawn("short-lived", false, async { Ok(()) })
            .unwrap();
        assert!(name.starts_with("short-lived-"));
        assert_eq!(name.len(), "short-lived-".len() + 6);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sup.inventory().is_empty());
    }

    #[tokio::test]
    async fn single_instance_names_collide() {
        let (sup, _token) = supervisor();
        sup.spawn("recv-loop", true, std::future::pending())
            .unwrap();
        assert!(sup.is_running("recv-loop"));

        let err = sup
            .spawn("recv-loop", true, async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, AgentError::TaskAlreadyRunning(_)));

        sup.cancel_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn cancel_removes_named_task() {
        let (sup, _token) = supervisor();
        sup.spawn("send-loop", true, std::future::pending())
            .unwrap();
        sup.cancel("send-loop");
        assert!(!sup.is_running("send-loop"));

        // Cancelled tasks may respawn under the same name.
        sup.spawn("send-loop", true, std::future::pending())
            .unwrap();
        sup.cancel_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn failed_task_trips_shutdown() {
        let (sup, token) = supervisor();
        sup.spawn("doomed", false, async {
            Err(AgentError::NotConnected)
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("shutdown should trip");
    }

    #[tokio::test]
    async fn cancel_all_awaits_cleanup() {
        let (sup, _token) = supervisor();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        sup.spawn("sleeper", true, async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        sup.cancel_all(Duration::from_secs(1)).await;
        assert!(sup.inventory().is_empty());
        // Aborted, not completed.
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn inventory_is_sorted() {
        let (sup, _token) = supervisor();
        sup.spawn("zulu", true, std::future::pending()).unwrap();
        sup.spawn("alpha", true, std::future::pending()).unwrap();
        assert_eq!(sup.inventory(), vec!["alpha", "zulu"]);
        sup.cancel_all(Duration::from_secs(1)).await;
    }
}
