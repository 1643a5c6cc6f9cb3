//! In-process WebSocket broker for end-to-end tests.
//!
//! Accepts any number of agent connections, enforces the login-first
//! exchange (`fail-token` is rejected), records every frame each
//! connection sends, and can push frames to connected agents or drop
//! them all to exercise reconnection. When `echo` is on, application
//! frames bounce straight back to their sender.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use framelink_protocol::Frame;

#[derive(Clone)]
enum Control {
    Push(Frame),
    Drop,
}

/// Handle to a running test broker.
pub struct Broker {
    pub endpoint: String,
    received: Arc<StdMutex<Vec<(usize, Frame)>>>,
    connections: Arc<AtomicUsize>,
    control: broadcast::Sender<Control>,
    shutdown: CancellationToken,
}

impl Broker {
    /// Binds an ephemeral port and starts accepting agents.
    pub async fn spawn(echo: bool) -> Broker {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (control, _) = broadcast::channel(64);
        let shutdown = CancellationToken::new();

        let broker = Broker {
            endpoint: format!("ws://{addr}/"),
            received: received.clone(),
            connections: connections.clone(),
            control: control.clone(),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(accept_loop(
            listener,
            echo,
            received,
            connections,
            control,
            shutdown,
        ));
        broker
    }

    /// Sends a frame to every connected agent.
    pub fn push(&self, frame: Frame) {
        let _ = self.control.send(Control::Push(frame));
    }

    /// Drops every live connection; the listener keeps running.
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Number of connections accepted so far (1-based ids).
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Snapshot of `(connection id, frame)` in arrival order.
    pub fn frames(&self) -> Vec<(usize, Frame)> {
        self.received.lock().unwrap().clone()
    }

    /// Waits until a frame with `name` arrives on connection `conn`.
    pub async fn wait_for_frame(&self, conn: usize, name: &str) -> Frame {
        let deadline = Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            loop {
                let hit = self
                    .frames()
                    .into_iter()
                    .find(|(id, frame)| *id == conn && frame.name() == name);
                if let Some((_, frame)) = hit {
                    return frame;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {name:?} frame on connection {conn}"))
    }

    /// Waits for the n-th connection to be accepted.
    pub async fn wait_for_connection(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.connection_count() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("connection {n} never arrived"));
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    echo: bool,
    received: Arc<StdMutex<Vec<(usize, Frame)>>>,
    connections: Arc<AtomicUsize>,
    control: broadcast::Sender<Control>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { return };
                let id = connections.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve_connection(
                    stream,
                    id,
                    echo,
                    received.clone(),
                    control.subscribe(),
                    shutdown.clone(),
                ));
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    id: usize,
    echo: bool,
    received: Arc<StdMutex<Vec<(usize, Frame)>>>,
    mut control: broadcast::Receiver<Control>,
    shutdown: CancellationToken,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    // Login-first: reject `fail-token`, ack everything else.
    let login = match stream.next().await {
        Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
            match Frame::from_json(&text) {
                Ok(frame) => frame,
                Err(_) => return,
            }
        }
        _ => return,
    };
    let token = login.data().get("token").and_then(|v| v.as_str());
    let reply_name = if token == Some("fail-token") {
        "login-fail"
    } else {
        "login-ok"
    };
    let reply = login.reply().named(reply_name).unwrap();
    if sink
        .send(reply.to_json().unwrap().into())
        .await
        .is_err()
        || reply_name == "login-fail"
    {
        return;
    }
    debug!(connection = id, "broker: agent authenticated");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            command = control.recv() => {
                match command {
                    Ok(Control::Push(frame)) => {
                        if sink.send(frame.to_json().unwrap().into()).await.is_err() {
                            return;
                        }
                    }
                    Ok(Control::Drop) => {
                        let _ = sink.close().await;
                        return;
                    }
                    Err(_) => continue,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                        let Ok(frame) = Frame::from_json(&text) else { continue };
                        received.lock().unwrap().push((id, frame.clone()));
                        if echo && sink.send(frame.to_json().unwrap().into()).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            }
        }
    }
}
