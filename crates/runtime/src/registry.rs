//! The `(kind, name) → handler` dispatch table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use framelink_protocol::Kind;

use crate::error::AgentError;
use crate::handler::Handler;
use crate::rate_limit::RateLimiter;

/// Internal lifecycle event names; never dispatched from the network
/// and never advertised in the `filter` command.
pub(crate) const INTERNAL_EVENTS: [&str; 2] = ["startup", "shutdown"];

/// A registered handler plus its rate-limit guard.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) handler: Handler,
    pub(crate) limiter: Option<Arc<RateLimiter>>,
}

impl HandlerEntry {
    fn new(handler: Handler) -> Self {
        let limits = handler.limits();
        let limiter = if limits.is_empty() {
            None
        } else {
            Some(Arc::new(RateLimiter::new(limits.iter().copied())))
        };
        Self { handler, limiter }
    }
}

/// Per-kind handler maps plus the interval-handler table.
#[derive(Default)]
pub(crate) struct Registry {
    handlers: HashMap<(Kind, String), HandlerEntry>,
    intervals: Vec<(String, Duration, HandlerEntry)>,
}

impl Registry {
    /// Registers a handler. `name == "*"` is the wildcard within the
    /// kind. Duplicate `(kind, name)` registrations fail.
    pub(crate) fn register(
        &mut self,
        kind: Kind,
        name: &str,
        handler: Handler,
    ) -> Result<(), AgentError> {
        let key = (kind, name.to_owned());
        if self.handlers.contains_key(&key) {
            return Err(AgentError::DuplicateHandler {
                kind,
                name: name.to_owned(),
            });
        }
        self.handlers.insert(key, HandlerEntry::new(handler));
        Ok(())
    }

    /// Removes a handler; returns whether one was registered.
    pub(crate) fn unregister(&mut self, kind: Kind, name: &str) -> bool {
        self.handlers.remove(&(kind, name.to_owned())).is_some()
    }

    /// Registers an interval handler at its period.
    pub(crate) fn register_interval(
        &mut self,
        name: &str,
        period: Duration,
        handler: Handler,
    ) -> Result<(), AgentError> {
        if self.intervals.iter().any(|(n, _, _)| n == name) {
            return Err(AgentError::DuplicateInterval(name.to_owned()));
        }
        self.intervals
            .push((name.to_owned(), period, HandlerEntry::new(handler)));
        Ok(())
    }

    /// Exact lookup, then the kind's wildcard.
    pub(crate) fn lookup(&self, kind: Kind, name: &str) -> Option<HandlerEntry> {
        self.handlers
            .get(&(kind, name.to_owned()))
            .or_else(|| self.handlers.get(&(kind, "*".to_owned())))
            .cloned()
    }

    /// Exact lookup only; lifecycle events never hit the wildcard.
    pub(crate) fn lookup_exact(&self, kind: Kind, name: &str) -> Option<HandlerEntry> {
        self.handlers.get(&(kind, name.to_owned())).cloned()
    }

    pub(crate) fn interval_entries(&self) -> Vec<(String, Duration, HandlerEntry)> {
        self.intervals.clone()
    }

    /// Registered frame names per kind, for the `filter` command.
    pub(crate) fn filter_names(&self) -> Value {
        let mut names: HashMap<&'static str, Vec<String>> = HashMap::from([
            ("command", Vec::new()),
            ("event", Vec::new()),
            ("message", Vec::new()),
            ("request", Vec::new()),
        ]);
        for (kind, name) in self.handlers.keys() {
            if *kind == Kind::Event && INTERNAL_EVENTS.contains(&name.as_str()) {
                continue;
            }
            if let Some(list) = names.get_mut(kind.label()) {
                list.push(name.clone());
            }
        }
        let mut obj = Map::new();
        for (kind, mut list) in names {
            list.sort();
            obj.insert(kind.to_owned(), Value::from(list));
        }
        Value::Object(obj)
    }
}
