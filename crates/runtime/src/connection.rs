//! Connection management: the reconnect heartbeat and the two loops.
//!
//! `ensure_connection` runs once at startup and then on every
//! scheduler tick. It is a no-op while connected; otherwise it
//! resolves the endpoint (mDNS when only a token is configured),
//! dials the transport, restores subscriptions, and restarts the
//! receive and send loops. Bad credentials stop the agent; anything
//! else waits for the next tick.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{debug, error, info, trace};

use framelink_discovery::Scheme;
use framelink_protocol::Frame;
use framelink_transport::{Transport, TransportError};

use crate::agent::AgentInner;
use crate::dispatch;
use crate::error::AgentError;

pub(crate) const RECV_LOOP: &str = "recv-loop";
pub(crate) const SEND_LOOP: &str = "send-loop";

/// Builds a connected transport for an endpoint/token pair.
pub type TransportFactory = Arc<
    dyn Fn(String, String) -> Pin<Box<dyn Future<Output = Result<Transport, TransportError>> + Send>>
        + Send
        + Sync,
>;

/// Dials via [`Transport::connect`], choosing the carrier by prefix.
pub fn default_transport_factory() -> TransportFactory {
    Arc::new(|endpoint, token| {
        Box::pin(async move { Transport::connect(&endpoint, &token).await })
    })
}

/// The reconnect heartbeat.
pub(crate) async fn ensure_connection(inner: &Arc<AgentInner>) {
    if inner.connected.load(Ordering::Relaxed) || inner.shutdown.is_cancelled() {
        return;
    }
    // One attempt at a time; ticks overlapping a slow dial bail out.
    if inner
        .connecting
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        return;
    }
    let result = try_connect(inner).await;
    inner.connecting.store(false, Ordering::Release);
    if let Err(e) = result {
        debug!(agent = %inner.name, error = %e, "connection attempt failed");
    }
}

async fn try_connect(inner: &Arc<AgentInner>) -> Result<(), AgentError> {
    let endpoint = inner.endpoint.lock().unwrap().clone();
    let token = inner.token.lock().unwrap().clone();

    if endpoint.is_empty() && token.is_empty() {
        // Standalone mode: nothing to connect to.
        return Ok(());
    }

    let endpoint = if endpoint.is_empty() {
        let service = inner.config.discovery_service.clone();
        match framelink_discovery::resolve_endpoint(&service, Scheme::Ws).await {
            Ok(resolved) => {
                info!(agent = %inner.name, endpoint = %resolved, "resolved broker via mDNS");
                *inner.endpoint.lock().unwrap() = resolved.clone();
                resolved
            }
            Err(e) => {
                error!(agent = %inner.name, error = %e, "broker discovery failed, stopping agent");
                inner.trigger_shutdown();
                return Ok(());
            }
        }
    } else {
        endpoint
    };

    let factory = inner.transport_factory.lock().unwrap().clone();
    let transport = match factory(endpoint.clone(), token).await {
        Ok(t) => Arc::new(t),
        Err(e) if e.is_permission_denied() => {
            error!(agent = %inner.name, error = %e, "login rejected, stopping agent");
            inner.trigger_shutdown();
            return Ok(());
        }
        Err(e) => {
            debug!(agent = %inner.name, endpoint = %endpoint, error = %e, "connect failed, retrying on next tick");
            return Ok(());
        }
    };

    // Replace any lingering loops from the previous connection.
    inner.supervisor.cancel(RECV_LOOP);
    inner.supervisor.cancel(SEND_LOOP);

    *inner.transport.lock().await = Some(transport.clone());
    inner.connected.store(true, Ordering::Relaxed);
    info!(agent = %inner.name, endpoint = %endpoint, "connected");

    inner
        .supervisor
        .spawn(RECV_LOOP, true, recv_loop(inner.clone(), transport.clone()))?;

    // Subscriptions go out before the send loop starts, so `filter`
    // and `join` are always the first two commands on a fresh wire.
    if let Err(e) = send_subscriptions(inner, &transport).await {
        debug!(agent = %inner.name, error = %e, "subscription setup failed");
        inner.connected.store(false, Ordering::Relaxed);
        return Ok(());
    }

    inner
        .supervisor
        .spawn(SEND_LOOP, true, send_loop(inner.clone(), transport))?;
    Ok(())
}

/// Advertises handled names and re-joins the current spaces.
async fn send_subscriptions(
    inner: &Arc<AgentInner>,
    transport: &Transport,
) -> Result<(), AgentError> {
    let names = inner.registry.lock().unwrap().filter_names();
    let filter = Frame::command("filter")?.large().with_data(json!({
        "names": names,
        "size": inner.config.max_frame_size,
    }))?;
    transport.send(&filter).await?;

    let mut spaces: Vec<String> = inner
        .spaces
        .lock()
        .unwrap()
        .iter()
        .cloned()
        .collect();
    if spaces.is_empty() && inner.config.join_all {
        spaces.push("*".to_owned());
    }
    if !spaces.is_empty() {
        let join = Frame::command("join")?
            .large()
            .with_data(json!({ "spaces": spaces }))?;
        transport.send(&join).await?;
    }
    Ok(())
}

/// Reads frames until the carrier fails or the loop is cancelled.
async fn recv_loop(inner: Arc<AgentInner>, transport: Arc<Transport>) -> Result<(), AgentError> {
    loop {
        match transport.recv().await {
            Ok(frame) => {
                trace!(agent = %inner.name, frame = %frame, "received");
                dispatch::dispatch_inbound(&inner, frame);
            }
            Err(e) => {
                debug!(agent = %inner.name, error = %e, "receive loop lost connection");
                inner.connected.store(false, Ordering::Relaxed);
                return Ok(());
            }
        }
    }
}

/// Drains the send queue in FIFO order.
async fn send_loop(inner: Arc<AgentInner>, transport: Arc<Transport>) -> Result<(), AgentError> {
    loop {
        let frame = inner.send_queue.pop().await;
        if let Err(e) = transport.send(&frame).await {
            debug!(agent = %inner.name, error = %e, "send loop lost connection");
            // The frame goes back to the head for the next connection.
            inner.send_queue.push_front(frame);
            inner.connected.store(false, Ordering::Relaxed);
            return Ok(());
        }
    }
}
