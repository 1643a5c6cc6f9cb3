//! In-memory queue carrier.
//!
//! [`QueueTransport::pair`] yields the agent side plus a [`QueuePeer`]
//! playing the broker, so tests can script the handshake and every
//! frame after it. [`QueueTransport::loopback`] wires the peer to a
//! background task that acks the login and discards everything else,
//! a null broker for `queue://` endpoints.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use framelink_protocol::Frame;

use crate::{TransportError, check_login_reply, login_frame};

/// The agent side of an in-memory frame pipe.
#[derive(Debug)]
pub struct QueueTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    connected: AtomicBool,
    endpoint: String,
}

/// The broker side of an in-memory frame pipe.
pub struct QueuePeer {
    tx: StdMutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl QueueTransport {
    /// Creates an unconnected transport and its scripted peer.
    pub fn pair() -> (QueueTransport, QueuePeer) {
        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (to_agent_tx, to_agent_rx) = mpsc::unbounded_channel();
        (
            QueueTransport {
                tx: StdMutex::new(Some(to_peer_tx)),
                rx: Mutex::new(to_agent_rx),
                connected: AtomicBool::new(false),
                endpoint: "queue://local".to_owned(),
            },
            QueuePeer {
                tx: StdMutex::new(Some(to_agent_tx)),
                rx: Mutex::new(to_peer_rx),
            },
        )
    }

    /// Connects against a null broker that acks login and discards
    /// application frames.
    pub async fn loopback(endpoint: &str, token: &str) -> Result<Self, TransportError> {
        let (mut transport, peer) = Self::pair();
        transport.endpoint = endpoint.to_owned();

        tokio::spawn(async move {
            if peer.expect_login(true).await.is_err() {
                return;
            }
            while peer.recv().await.is_some() {
                // Null broker: nothing listens on the other side.
            }
        });

        transport.login(token).await?;
        Ok(transport)
    }

    /// Performs the login handshake against the peer.
    pub async fn login(&self, token: &str) -> Result<(), TransportError> {
        self.send_raw(&login_frame(token)?)?;
        let reply = self.recv_raw().await?;
        check_login_reply(&self.endpoint, &reply)?;
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.send_raw(frame)
    }

    pub async fn recv(&self) -> Result<Frame, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        match self.recv_raw().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.connected.store(false, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.tx.lock().unwrap().take();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send_raw(&self, frame: &Frame) -> Result<(), TransportError> {
        let guard = self.tx.lock().unwrap();
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        trace!(frame = %frame, "queue send");
        tx.send(frame.clone()).map_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
            TransportError::Closed
        })
    }

    async fn recv_raw(&self) -> Result<Frame, TransportError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }
}

impl QueuePeer {
    /// Sends a frame to the agent side.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let guard = self.tx.lock().unwrap();
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Receives the next frame from the agent side, or `None` once the
    /// agent has closed.
    pub async fn recv(&self) -> Option<Frame> {
        self.rx.lock().await.recv().await
    }

    /// Waits for the agent's `login` command and replies `login-ok`
    /// (or `login-fail` when `accept` is false).
    pub async fn expect_login(&self, accept: bool) -> Result<Frame, TransportError> {
        let frame = self.recv().await.ok_or(TransportError::Closed)?;
        let reply = if accept { "login-ok" } else { "login-fail" };
        self.send(frame.reply().named(reply)?)?;
        Ok(frame)
    }

    /// Drops the peer's sender so the agent side observes a closed
    /// connection on its next receive.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}
