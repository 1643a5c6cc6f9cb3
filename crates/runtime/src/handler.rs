//! Handler callables and their registration-time properties.
//!
//! A [`Handler`] wraps the user's callable together with two declared
//! properties: whether it consumes the frame, and whether it is
//! asynchronous. Blocking handlers run on the worker pool so they
//! cannot stall the event loop; async handlers run cooperatively.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::rate_limit::RateLimit;

/// Error type handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns. A `Some` value becomes the reply `data`
/// when the handled frame was a REQUEST; it is ignored otherwise.
pub type HandlerResult = Result<Option<Value>, HandlerError>;

type AsyncFn = Arc<
    dyn Fn(framelink_protocol::Frame) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>>
        + Send
        + Sync,
>;
type BlockingFn = Arc<dyn Fn(framelink_protocol::Frame) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
enum Invoker {
    Async(AsyncFn),
    Blocking(BlockingFn),
}

/// A registered callable plus its declared invocation properties.
#[derive(Clone)]
pub struct Handler {
    invoker: Invoker,
    accepts_frame: bool,
    limits: Vec<RateLimit>,
}

impl Handler {
    /// Async handler that consumes the frame.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(framelink_protocol::Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            invoker: Invoker::Async(Arc::new(move |frame| Box::pin(f(frame)))),
            accepts_frame: true,
            limits: Vec::new(),
        }
    }

    /// Async handler invoked with no arguments.
    pub fn nullary<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            invoker: Invoker::Async(Arc::new(move |_frame| Box::pin(f()))),
            accepts_frame: false,
            limits: Vec::new(),
        }
    }

    /// Synchronous handler that consumes the frame; runs on the
    /// worker pool.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(framelink_protocol::Frame) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            invoker: Invoker::Blocking(Arc::new(f)),
            accepts_frame: true,
            limits: Vec::new(),
        }
    }

    /// Synchronous handler invoked with no arguments; runs on the
    /// worker pool.
    pub fn blocking_nullary<F>(f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            invoker: Invoker::Blocking(Arc::new(move |_frame| f())),
            accepts_frame: false,
            limits: Vec::new(),
        }
    }

    /// Adds a rate limit; may be chained for multiple windows.
    pub fn limit(mut self, limit: RateLimit) -> Self {
        self.limits.push(limit);
        self
    }

    pub fn accepts_frame(&self) -> bool {
        self.accepts_frame
    }

    pub fn is_async(&self) -> bool {
        matches!(self.invoker, Invoker::Async(_))
    }

    pub(crate) fn limits(&self) -> &[RateLimit] {
        &self.limits
    }

    /// Runs the handler. Blocking callables are offloaded so the
    /// caller's task keeps breathing.
    pub(crate) async fn invoke(&self, frame: framelink_protocol::Frame) -> HandlerResult {
        match &self.invoker {
            Invoker::Async(f) => f(frame).await,
            Invoker::Blocking(f) => {
                let f = f.clone();
                match tokio::task::spawn_blocking(move || f(frame)).await {
                    Ok(result) => result,
                    Err(e) => Err(format!("blocking handler panicked: {e}").into()),
                }
            }
        }
    }
}
