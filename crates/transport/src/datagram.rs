//! UDP datagram carrier (one JSON frame per datagram).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use framelink_protocol::{Frame, FrameError};

use crate::{TransportError, check_login_reply, login_frame};

/// Largest datagram the carrier will read.
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP carrier for `dgram://host:port/` endpoints.
#[derive(Debug)]
pub struct DatagramTransport {
    socket: UdpSocket,
    connected: AtomicBool,
    endpoint: String,
}

fn parse_endpoint(endpoint: &str) -> Result<&str, TransportError> {
    let addr = endpoint
        .strip_prefix("dgram://")
        .ok_or_else(|| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: "expected dgram:// prefix".to_owned(),
        })?
        .trim_end_matches('/');
    if addr.rsplit_once(':').is_none_or(|(host, port)| {
        host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit())
    }) {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: "expected host:port".to_owned(),
        });
    }
    Ok(addr)
}

impl DatagramTransport {
    /// Binds an ephemeral local port, connects the socket to the
    /// broker, and completes the login handshake.
    pub async fn connect(endpoint: &str, token: &str) -> Result<Self, TransportError> {
        let addr = parse_endpoint(endpoint)?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let transport = Self {
            socket,
            connected: AtomicBool::new(false),
            endpoint: endpoint.to_owned(),
        };

        transport.send_raw(&login_frame(token)?).await?;
        let reply = transport.recv_raw().await?;
        check_login_reply(endpoint, &reply)?;
        transport.connected.store(true, Ordering::Relaxed);
        debug!(endpoint = %endpoint, "datagram connected");
        Ok(transport)
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.send_raw(frame).await.inspect_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
        })
    }

    pub async fn recv(&self) -> Result<Frame, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.recv_raw().await.inspect_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
        })
    }

    pub fn close(&self) {
        // UDP has no close exchange; the socket dies with the transport.
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_raw(&self, frame: &Frame) -> Result<(), TransportError> {
        trace!(frame = %frame, "datagram send");
        self.socket.send(frame.to_json()?.as_bytes()).await?;
        Ok(())
    }

    async fn recv_raw(&self) -> Result<Frame, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        let text = String::from_utf8(buf).map_err(FrameError::from)?;
        Ok(Frame::from_json(&text)?)
    }
}
