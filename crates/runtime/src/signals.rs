//! Process signal wiring.
//!
//! Interrupt and terminate trip the shutdown trigger. On Unix the
//! user-defined-1 signal logs the spawned-task inventory without
//! stopping anything.

use std::sync::Arc;

use crate::agent::AgentInner;
use crate::error::AgentError;

#[cfg(unix)]
pub(crate) fn install(inner: &Arc<AgentInner>) -> Result<(), AgentError> {
    use tokio::signal::unix::{SignalKind, signal};
    use tracing::{info, warn};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut inventory = signal(SignalKind::user_defined1())?;

    let task_inner = inner.clone();
    inner.supervisor.spawn("signal-listener", true, async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    warn!(agent = %task_inner.name, "interrupt received, shutting down");
                    task_inner.trigger_shutdown();
                    break;
                }
                _ = terminate.recv() => {
                    warn!(agent = %task_inner.name, "termination signal received, shutting down");
                    task_inner.trigger_shutdown();
                    break;
                }
                _ = inventory.recv() => {
                    info!(
                        agent = %task_inner.name,
                        tasks = ?task_inner.supervisor.inventory(),
                        "running tasks"
                    );
                }
            }
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install(inner: &Arc<AgentInner>) -> Result<(), AgentError> {
    use tracing::warn;

    let task_inner = inner.clone();
    inner.supervisor.spawn("signal-listener", true, async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(agent = %task_inner.name, "interrupt received, shutting down");
            task_inner.trigger_shutdown();
        }
        Ok(())
    })?;
    Ok(())
}
