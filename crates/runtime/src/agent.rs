//! The agent facade.
//!
//! An [`Agent`] owns the registry, the supervisor, the scheduler, the
//! send queue, the pending-response table, and the connection state,
//! and wires them into the lifecycle described in the crate docs:
//! `Created → Starting → Running → Stopping → Stopped`.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use framelink_protocol::{Frame, Kind};
use framelink_transport::Transport;

use crate::config::AgentConfig;
use crate::connection::{self, TransportFactory, default_transport_factory};
use crate::dispatch;
use crate::error::AgentError;
use crate::handler::Handler;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::send_queue::SendQueue;
use crate::signals;
use crate::spaces::{normalize_iter, normalize_str};
use crate::supervisor::Supervisor;

/// Lifecycle states of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A process participant: registers handlers, exchanges frames with a
/// broker (or locally in standalone mode), and supervises its tasks.
#[derive(Clone)]
pub struct Agent {
    pub(crate) inner: Arc<AgentInner>,
}

pub(crate) struct AgentInner {
    pub(crate) name: String,
    pub(crate) config: AgentConfig,
    pub(crate) endpoint: StdMutex<String>,
    pub(crate) token: StdMutex<String>,
    pub(crate) registry: StdMutex<Registry>,
    pub(crate) supervisor: Supervisor,
    pub(crate) scheduler: Scheduler,
    pub(crate) send_queue: SendQueue,
    pub(crate) pending: StdMutex<HashMap<String, oneshot::Sender<Frame>>>,
    pub(crate) spaces: StdMutex<BTreeSet<String>>,
    pub(crate) transport: Mutex<Option<Arc<Transport>>>,
    pub(crate) transport_factory: StdMutex<TransportFactory>,
    pub(crate) connected: AtomicBool,
    pub(crate) connecting: AtomicBool,
    pub(crate) state: StdMutex<AgentState>,
    pub(crate) shutdown: CancellationToken,
}

impl Agent {
    /// Creates an agent with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, AgentConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: AgentConfig) -> Self {
        let shutdown = CancellationToken::new();
        let inner = AgentInner {
            name: name.into(),
            send_queue: SendQueue::new(config.send_queue_capacity),
            config,
            endpoint: StdMutex::new(String::new()),
            token: StdMutex::new(String::new()),
            registry: StdMutex::new(Registry::default()),
            supervisor: Supervisor::new(shutdown.clone()),
            scheduler: Scheduler::new(),
            pending: StdMutex::new(HashMap::new()),
            spaces: StdMutex::new(BTreeSet::new()),
            transport: Mutex::new(None),
            transport_factory: StdMutex::new(default_transport_factory()),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            state: StdMutex::new(AgentState::Created),
            shutdown,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> AgentState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Names of the currently running background tasks.
    pub fn task_inventory(&self) -> Vec<String> {
        self.inner.supervisor.inventory()
    }

    // --- Registration -------------------------------------------------

    pub fn on_command(&self, name: &str, handler: Handler) -> Result<(), AgentError> {
        self.register(Kind::Command, name, handler)
    }

    pub fn on_event(&self, name: &str, handler: Handler) -> Result<(), AgentError> {
        self.register(Kind::Event, name, handler)
    }

    pub fn on_message(&self, name: &str, handler: Handler) -> Result<(), AgentError> {
        self.register(Kind::Message, name, handler)
    }

    pub fn on_request(&self, name: &str, handler: Handler) -> Result<(), AgentError> {
        self.register(Kind::Request, name, handler)
    }

    /// Registers a periodic handler; it receives `interval-elapsed`
    /// frames carrying a 1-based `count`.
    pub fn on_interval(
        &self,
        name: &str,
        period: Duration,
        handler: Handler,
    ) -> Result<(), AgentError> {
        self.inner
            .registry
            .lock()
            .unwrap()
            .register_interval(name, period, handler)
    }

    fn register(&self, kind: Kind, name: &str, handler: Handler) -> Result<(), AgentError> {
        self.inner
            .registry
            .lock()
            .unwrap()
            .register(kind, name, handler)
    }

    /// Removes a handler so the name can be registered again.
    pub fn remove_handler(&self, kind: Kind, name: &str) -> bool {
        self.inner.registry.lock().unwrap().unregister(kind, name)
    }

    /// Replaces how transports are built: the seam used by tests and
    /// embedders that bring their own carrier.
    pub fn set_transport_factory(&self, factory: TransportFactory) {
        *self.inner.transport_factory.lock().unwrap() = factory;
    }

    // --- Lifecycle ----------------------------------------------------

    /// Runs the agent until the shutdown trigger fires.
    ///
    /// Empty `endpoint` and `token` select standalone mode. An empty
    /// `endpoint` with a token resolves the broker via mDNS.
    pub async fn run(&self, endpoint: &str, token: &str) -> Result<(), AgentError> {
        match self.start(endpoint, token).await {
            Ok(()) => {}
            // Another run owns this agent; leave it alone.
            Err(e @ AgentError::InvalidState(_)) => return Err(e),
            Err(e) => {
                self.inner.trigger_shutdown();
                self.finish().await;
                return Err(e);
            }
        }
        self.inner.shutdown.cancelled().await;
        self.finish().await;
        Ok(())
    }

    /// Brings the agent to `Running` and returns; pair with
    /// [`stop`](Self::stop) and a surrounding [`run`](Self::run) or
    /// your own wait on completion.
    pub async fn start(&self, endpoint: &str, token: &str) -> Result<(), AgentError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != AgentState::Created {
                return Err(AgentError::InvalidState(*state));
            }
            *state = AgentState::Starting;
        }
        *self.inner.endpoint.lock().unwrap() = endpoint.to_owned();
        *self.inner.token.lock().unwrap() = token.to_owned();
        info!(agent = %self.inner.name, endpoint = %endpoint, "starting agent");

        if self.inner.config.install_signal_handlers {
            signals::install(&self.inner)?;
        }

        // Reconnect heartbeat.
        {
            let inner = self.inner.clone();
            self.inner.scheduler.schedule(
                &self.inner.supervisor,
                "ensure-connection",
                self.inner.config.ensure_connection_interval,
                move |_count| {
                    let inner = inner.clone();
                    async move {
                        connection::ensure_connection(&inner).await;
                        Ok(())
                    }
                },
            )?;
        }

        // First attempt happens synchronously so startup reflects
        // initial reachability.
        connection::ensure_connection(&self.inner).await;

        self.inner.run_lifecycle_event("startup").await?;

        // Interval handlers only start after `startup` completes.
        let intervals = self.inner.registry.lock().unwrap().interval_entries();
        for (name, period, entry) in intervals {
            let inner = self.inner.clone();
            let interval_name = name.clone();
            self.inner.scheduler.schedule(
                &self.inner.supervisor,
                &format!("interval-{name}"),
                period,
                move |count| {
                    let inner = inner.clone();
                    let entry = entry.clone();
                    let interval_name = interval_name.clone();
                    async move {
                        dispatch::run_interval(&inner, &interval_name, entry, count).await
                    }
                },
            )?;
        }

        *self.inner.state.lock().unwrap() = AgentState::Running;
        info!(agent = %self.inner.name, "agent running");
        Ok(())
    }

    /// Trips the shutdown trigger. Safe to call from any task.
    pub fn stop(&self) {
        info!(agent = %self.inner.name, "stopping agent");
        self.inner.trigger_shutdown();
    }

    async fn finish(&self) {
        *self.inner.state.lock().unwrap() = AgentState::Stopping;
        self.inner.scheduler.pause();

        if let Err(e) = self.inner.run_lifecycle_event("shutdown").await {
            warn!(agent = %self.inner.name, error = %e, "shutdown handler failed");
        }

        self.inner.connected.store(false, Ordering::Relaxed);
        if let Some(transport) = self.inner.transport.lock().await.take() {
            transport.close().await;
        }

        self.inner
            .supervisor
            .cancel_all(self.inner.config.shutdown_grace)
            .await;

        *self.inner.state.lock().unwrap() = AgentState::Stopped;
        info!(agent = %self.inner.name, "agent stopped");
    }

    /// Spawns a user background task under supervision.
    ///
    /// `single` uses the exact name and fails when it is taken; other
    /// tasks get a random suffix. An error return stops the agent.
    pub fn spawn<F>(&self, name: &str, single: bool, fut: F) -> Result<String, AgentError>
    where
        F: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        self.inner.supervisor.spawn(name, single, fut)
    }

    // --- Send primitives ----------------------------------------------

    /// Emits an EVENT. Queued when hosted, dispatched locally when
    /// standalone.
    pub fn emit(&self, name: &str, data: Value) -> Result<(), AgentError> {
        let frame = Frame::new(name, Kind::Event)?.with_data(data)?;
        self.inner.outbound(frame)
    }

    /// Sends a MESSAGE with `data.text` and optional `meta.locale`.
    pub fn message(
        &self,
        name: &str,
        text: &str,
        locale: Option<&str>,
        data: Value,
    ) -> Result<(), AgentError> {
        let Value::Object(mut map) = data else {
            return Err(framelink_protocol::FrameError::NotAnObject { field: "data" }.into());
        };
        map.insert("text".into(), Value::String(text.to_owned()));
        let mut frame = Frame::new(name, Kind::Message)?.with_data(Value::Object(map))?;
        if let Some(locale) = locale {
            frame = frame.with_meta_entry("locale", json!(locale))?;
        }
        self.inner.outbound(frame)
    }

    /// Sends a COMMAND directly on the transport, skipping the queue.
    pub async fn command(&self, name: &str, data: Value) -> Result<(), AgentError> {
        let frame = Frame::new(name, Kind::Command)?.with_data(data)?;
        self.inner.send_direct(frame).await
    }

    /// Queued variant of [`command`](Self::command).
    pub fn command_queued(&self, name: &str, data: Value) -> Result<(), AgentError> {
        let frame = Frame::new(name, Kind::Command)?.with_data(data)?;
        self.inner.outbound(frame)
    }

    /// Sends a REQUEST and awaits its RESPONSE.
    ///
    /// Resolves to the reply's `data`, or `data._response` when the
    /// responder returned a bare value. Fails with a request-timeout
    /// error at the deadline; late replies are dropped.
    pub async fn request(
        &self,
        name: &str,
        timeout: Duration,
        data: Value,
    ) -> Result<Value, AgentError> {
        let frame = Frame::new(name, Kind::Request)?.with_data(data)?;
        let uuid = frame.uuid().to_owned();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(uuid.clone(), tx);

        if let Err(e) = self.inner.outbound(frame) {
            self.inner.pending.lock().unwrap().remove(&uuid);
            return Err(e);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        self.inner.pending.lock().unwrap().remove(&uuid);

        match result {
            Ok(Ok(reply)) => Ok(match reply.data().get("_response") {
                Some(value) => value.clone(),
                None => Value::Object(reply.data().clone()),
            }),
            Ok(Err(_)) => Err(AgentError::Stopped),
            Err(_) => Err(AgentError::RequestTimeout {
                name: name.to_owned(),
                timeout,
            }),
        }
    }

    // --- Spaces -------------------------------------------------------

    /// Joins spaces given as a comma- or space-separated list.
    pub async fn join(&self, spaces: &str) -> Result<(), AgentError> {
        self.join_many(normalize_str(spaces)).await
    }

    /// Joins spaces from any iterable of names.
    pub async fn join_many<I, S>(&self, spaces: I) -> Result<(), AgentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = normalize_iter(spaces);
        if set.is_empty() {
            return Ok(());
        }
        self.inner.spaces.lock().unwrap().extend(set.iter().cloned());
        debug!(agent = %self.inner.name, spaces = ?set, "joining spaces");
        self.inner.send_space_command("join", set).await
    }

    /// Leaves spaces given as a comma- or space-separated list.
    pub async fn leave(&self, spaces: &str) -> Result<(), AgentError> {
        self.leave_many(normalize_str(spaces)).await
    }

    /// Leaves spaces from any iterable of names.
    pub async fn leave_many<I, S>(&self, spaces: I) -> Result<(), AgentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = normalize_iter(spaces);
        if set.is_empty() {
            return Ok(());
        }
        {
            let mut current = self.inner.spaces.lock().unwrap();
            for name in &set {
                current.remove(name);
            }
        }
        debug!(agent = %self.inner.name, spaces = ?set, "leaving spaces");
        self.inner.send_space_command("leave", set).await
    }

    /// The currently joined spaces, sorted.
    pub fn joined_spaces(&self) -> Vec<String> {
        self.inner.spaces.lock().unwrap().iter().cloned().collect()
    }
}

impl AgentInner {
    /// Standalone mode: no endpoint and no token configured.
    pub(crate) fn standalone(&self) -> bool {
        self.endpoint.lock().unwrap().is_empty() && self.token.lock().unwrap().is_empty()
    }

    /// Pauses the scheduler and trips the shutdown trigger.
    pub(crate) fn trigger_shutdown(&self) {
        self.scheduler.pause();
        self.shutdown.cancel();
    }

    /// Routes an outbound frame: local dispatch when standalone,
    /// otherwise onto the send queue.
    pub(crate) fn outbound(self: &Arc<Self>, frame: Frame) -> Result<(), AgentError> {
        if self.standalone() {
            dispatch::dispatch_inbound(self, frame);
            Ok(())
        } else {
            self.send_queue.push(frame)
        }
    }

    /// Writes a frame straight to the transport, bypassing the queue.
    pub(crate) async fn send_direct(self: &Arc<Self>, frame: Frame) -> Result<(), AgentError> {
        if self.standalone() {
            dispatch::dispatch_inbound(self, frame);
            return Ok(());
        }
        let transport = self.transport.lock().await.clone();
        match transport {
            Some(t) if self.connected.load(Ordering::Relaxed) => {
                t.send(&frame).await?;
                Ok(())
            }
            _ => Err(AgentError::NotConnected),
        }
    }

    /// Sends `join`/`leave` to the broker when a connection exists.
    ///
    /// Skipped silently otherwise; the space set is re-sent on every
    /// reconnect, so the broker converges.
    pub(crate) async fn send_space_command(
        self: &Arc<Self>,
        command: &str,
        spaces: BTreeSet<String>,
    ) -> Result<(), AgentError> {
        if self.standalone() {
            return Ok(());
        }
        let names: Vec<&str> = spaces.iter().map(String::as_str).collect();
        let frame = Frame::command(command)?
            .large()
            .with_data(json!({ "spaces": names }))?;
        match self.send_direct(frame).await {
            Ok(()) => Ok(()),
            Err(AgentError::NotConnected) => {
                debug!(agent = %self.name, command, "not connected; spaces sync on reconnect");
                Ok(())
            }
            Err(AgentError::Transport(e)) => {
                debug!(agent = %self.name, command, error = %e, "send failed; spaces sync on reconnect");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the `startup`/`shutdown` event handler, when registered.
    pub(crate) async fn run_lifecycle_event(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<(), AgentError> {
        let entry = self
            .registry
            .lock()
            .unwrap()
            .lookup_exact(Kind::Event, name);
        let Some(entry) = entry else {
            return Ok(());
        };
        debug!(agent = %self.name, event = %name, "running lifecycle handler");
        let frame = Frame::new(name, Kind::Event)?;
        match tokio::time::timeout(self.config.handler_timeout, entry.handler.invoke(frame)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AgentError::Handler {
                name: name.to_owned(),
                reason: e,
            }),
            Err(_) => Err(AgentError::HandlerTimeout {
                kind: Kind::Event,
                name: name.to_owned(),
                timeout: self.config.handler_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_agent() -> Agent {
        let mut config = AgentConfig::default();
        config.install_signal_handlers = false;
        config.ensure_connection_interval = Duration::from_millis(50);
        Agent::with_config("test-agent", config)
    }

    async fn wait_for_state(agent: &Agent, state: AgentState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while agent.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("agent never reached {state:?}"));
    }

    #[tokio::test]
    async fn standalone_lifecycle_runs_startup_and_shutdown() {
        let agent = test_agent();
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));

        let flag = started.clone();
        agent
            .on_event(
                "startup",
                Handler::new(move |_frame| {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(None)
                    }
                }),
            )
            .unwrap();
        let flag = stopped.clone();
        agent
            .on_event(
                "shutdown",
                Handler::nullary(move || {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(None)
                    }
                }),
            )
            .unwrap();

        assert_eq!(agent.state(), AgentState::Created);
        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run("", "").await })
        };

        wait_for_state(&agent, AgentState::Running).await;
        assert!(started.load(Ordering::SeqCst));
        assert!(!stopped.load(Ordering::SeqCst));

        agent.stop();
        runner.await.unwrap().unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn start_from_non_created_state_fails() {
        let agent = test_agent();
        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run("", "").await })
        };
        wait_for_state(&agent, AgentState::Running).await;

        let err = agent.start("", "").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(AgentState::Running)));

        agent.stop();
        runner.await.unwrap().unwrap();
        let err = agent.start("", "").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(AgentState::Stopped)));
    }

    #[tokio::test]
    async fn wildcard_handler_sees_events_in_order() {
        let agent = test_agent();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        agent
            .on_event(
                "*",
                Handler::new(move |frame| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(frame.name().to_owned());
                        Ok(None)
                    }
                }),
            )
            .unwrap();

        agent.emit("alpha", json!({})).unwrap();
        agent.emit("bravo", json!({})).unwrap();
        agent.emit("charlie", json!({})).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["alpha", "bravo", "charlie"]
        );
    }

    #[tokio::test]
    async fn duplicate_registration_fails_until_removed() {
        let agent = test_agent();
        let noop = || Handler::nullary(|| async { Ok(None) });

        agent.on_command("deploy", noop()).unwrap();
        assert!(matches!(
            agent.on_command("deploy", noop()),
            Err(AgentError::DuplicateHandler { .. })
        ));

        assert!(agent.remove_handler(Kind::Command, "deploy"));
        agent.on_command("deploy", noop()).unwrap();
    }

    #[tokio::test]
    async fn standalone_request_gets_object_reply() {
        let agent = test_agent();
        agent
            .on_request(
                "whoami",
                Handler::nullary(|| async { Ok(Some(json!({ "name": "A" }))) }),
            )
            .unwrap();

        let value = agent
            .request("whoami", Duration::from_secs(1), json!({}))
            .await
            .unwrap();
        assert_eq!(value, json!({ "name": "A" }));
    }

    #[tokio::test]
    async fn bare_reply_values_come_back_via_response_key() {
        let agent = test_agent();
        agent
            .on_request("answer", Handler::nullary(|| async { Ok(Some(json!(42))) }))
            .unwrap();

        let value = agent
            .request("answer", Duration::from_secs(1), json!({}))
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn request_times_out_and_cleans_pending() {
        let agent = test_agent();
        let err = agent
            .request("nobody-home", Duration::from_millis(50), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RequestTimeout { .. }));
        assert!(agent.inner.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_carries_text_and_locale() {
        let agent = test_agent();
        let captured = Arc::new(StdMutex::new(None));
        let slot = captured.clone();
        agent
            .on_message(
                "greet",
                Handler::new(move |frame| {
                    let slot = slot.clone();
                    async move {
                        *slot.lock().unwrap() = Some(frame);
                        Ok(None)
                    }
                }),
            )
            .unwrap();

        agent
            .message("greet", "hello there", Some("en"), json!({ "urgent": true }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let frame = captured.lock().unwrap().take().unwrap();
        assert_eq!(frame.kind(), Kind::Message);
        assert_eq!(frame.data()["text"], "hello there");
        assert_eq!(frame.data()["urgent"], true);
        assert_eq!(frame.meta()["locale"], "en");
    }

    #[tokio::test]
    async fn join_and_leave_normalize_the_space_set() {
        let agent = test_agent();
        agent.join("home, work").await.unwrap();
        assert_eq!(agent.joined_spaces(), vec!["home", "work"]);

        agent.join("home lab").await.unwrap();
        assert_eq!(agent.joined_spaces(), vec!["home", "lab", "work"]);

        agent.leave("work, lab").await.unwrap();
        assert_eq!(agent.joined_spaces(), vec!["home"]);

        // Blanks and duplicates vanish.
        agent.join("  home ,, home  ").await.unwrap();
        assert_eq!(agent.joined_spaces(), vec!["home"]);
    }

    #[tokio::test]
    async fn rate_limited_handler_skips_excess_invocations() {
        let agent = test_agent();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        agent
            .on_command(
                "throttled",
                Handler::new(move |_frame| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    }
                })
                .limit("2/s".parse().unwrap()),
            )
            .unwrap();

        for _ in 0..3 {
            agent.command("throttled", json!({})).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hosted_send_queue_enforces_high_water_mark() {
        let mut config = AgentConfig::default();
        config.install_signal_handlers = false;
        config.send_queue_capacity = 2;
        let agent = Agent::with_config("test-agent", config);
        // Hosted mode without a live connection: frames accumulate.
        *agent.inner.endpoint.lock().unwrap() = "queue://nowhere".to_owned();
        *agent.inner.token.lock().unwrap() = "test-token".to_owned();

        agent.emit("first", json!({})).unwrap();
        agent.emit("second", json!({})).unwrap();
        assert!(matches!(
            agent.emit("third", json!({})),
            Err(AgentError::QueueFull { capacity: 2 })
        ));
    }

    #[tokio::test]
    async fn emit_rejects_non_object_data() {
        let agent = test_agent();
        assert!(agent.emit("bad-data", json!([1, 2, 3])).is_err());
    }

    #[tokio::test]
    async fn failing_handler_stops_the_agent() {
        let agent = test_agent();
        agent
            .on_event(
                "explode",
                Handler::nullary(|| async { Err("kaboom".into()) }),
            )
            .unwrap();

        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run("", "").await })
        };
        wait_for_state(&agent, AgentState::Running).await;

        agent.emit("explode", json!({})).unwrap();
        runner.await.unwrap().unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);
    }

    #[tokio::test]
    async fn interval_handlers_tick_with_counts() {
        let agent = test_agent();
        let counts = Arc::new(StdMutex::new(Vec::new()));
        let sink = counts.clone();
        agent
            .on_interval(
                "pulse",
                Duration::from_millis(30),
                Handler::new(move |frame| {
                    let sink = sink.clone();
                    async move {
                        sink.lock()
                            .unwrap()
                            .push(frame.data()["count"].as_u64().unwrap());
                        Ok(None)
                    }
                }),
            )
            .unwrap();

        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run("", "").await })
        };
        wait_for_state(&agent, AgentState::Running).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        agent.stop();
        runner.await.unwrap().unwrap();

        let counts = counts.lock().unwrap();
        assert!(counts.len() >= 2, "expected at least two ticks, got {counts:?}");
        assert_eq!(counts[0], 1);
        assert_eq!(counts[1], 2);
    }
}

