//! Inbound frame routing and handler execution.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use framelink_protocol::{Frame, Kind};

use crate::agent::AgentInner;
use crate::error::AgentError;
use crate::registry::{HandlerEntry, INTERNAL_EVENTS};

/// Routes one inbound frame.
///
/// Lifecycle names are dropped, RESPONSEs satisfy the pending table,
/// `ping` is answered, and everything else spawns a handler task named
/// `handler-<name>-<uuid>`.
pub(crate) fn dispatch_inbound(inner: &Arc<AgentInner>, frame: Frame) {
    trace!(agent = %inner.name, frame = %frame, "dispatching");

    if INTERNAL_EVENTS.contains(&frame.name()) {
        debug!(agent = %inner.name, frame = %frame, "dropping lifecycle frame");
        return;
    }

    if frame.kind() == Kind::Response {
        let Some(uuid) = frame.reply_to().map(str::to_owned) else {
            debug!(agent = %inner.name, frame = %frame, "response without reply_to, dropping");
            return;
        };
        let slot = inner.pending.lock().unwrap().remove(&uuid);
        match slot {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!(agent = %inner.name, reply_to = %uuid, "response for unknown request, dropping"),
        }
        return;
    }

    if frame.kind() == Kind::Command && frame.name() == "ping" {
        match frame.reply().named("pong") {
            Ok(pong) => {
                if let Err(e) = inner.outbound(pong) {
                    warn!(agent = %inner.name, error = %e, "failed to queue pong");
                }
            }
            Err(e) => warn!(agent = %inner.name, error = %e, "failed to build pong"),
        }
        return;
    }

    let entry = inner
        .registry
        .lock()
        .unwrap()
        .lookup(frame.kind(), frame.name());
    let Some(entry) = entry else {
        debug!(agent = %inner.name, frame = %frame, "unhandled frame, dropping");
        return;
    };

    let task_name = format!("handler-{}-{}", frame.name(), frame.uuid());
    let task_inner = inner.clone();
    if let Err(e) = inner
        .supervisor
        .spawn(&task_name, true, run_handler(task_inner, entry, frame))
    {
        warn!(agent = %inner.name, error = %e, "could not spawn handler task");
    }
}

/// One handler invocation: rate-limit guard, deadline, reply plumbing.
async fn run_handler(
    inner: Arc<AgentInner>,
    entry: HandlerEntry,
    frame: Frame,
) -> Result<(), AgentError> {
    let kind = frame.kind();
    let name = frame.name().to_owned();

    if let Some(limiter) = &entry.limiter {
        if let Err(limit) = limiter.try_acquire() {
            let err = AgentError::RateLimited {
                kind,
                name: name.clone(),
                limit,
            };
            warn!(agent = %inner.name, error = %err, "invocation skipped");
            return Ok(());
        }
    }

    let source = frame.clone();
    let timeout = inner.config.handler_timeout;
    match tokio::time::timeout(timeout, entry.handler.invoke(frame)).await {
        Err(_) => {
            let err = AgentError::HandlerTimeout {
                kind,
                name,
                timeout,
            };
            warn!(agent = %inner.name, error = %err, "handler timed out");
            Ok(())
        }
        Ok(Err(e)) => Err(AgentError::Handler { name, reason: e }),
        Ok(Ok(Some(value))) if source.kind() == Kind::Request => {
            let data = match value {
                Value::Object(_) => value,
                other => json!({ "_response": other }),
            };
            let reply = source.reply().large().with_data(data)?;
            inner.outbound(reply)?;
            Ok(())
        }
        Ok(Ok(_)) => Ok(()),
    }
}

/// One interval-handler tick.
pub(crate) async fn run_interval(
    inner: &Arc<AgentInner>,
    name: &str,
    entry: HandlerEntry,
    count: u64,
) -> Result<(), AgentError> {
    let frame = Frame::event("interval-elapsed")?.with_data(json!({ "count": count }))?;
    let timeout = inner.config.handler_timeout;
    match tokio::time::timeout(timeout, entry.handler.invoke(frame)).await {
        Err(_) => {
            warn!(agent = %inner.name, interval = %name, "interval handler timed out");
            Ok(())
        }
        Ok(Err(e)) => Err(AgentError::Handler {
            name: name.to_owned(),
            reason: e,
        }),
        Ok(Ok(_)) => Ok(()),
    }
}
