//! WebSocket carrier (text JSON frames).

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::{debug, trace, warn};

use framelink_protocol::Frame;

use crate::{MAX_FRAME_SIZE, TransportError, check_login_reply, login_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket carrier for `ws://` and `wss://` endpoints.
///
/// `wss://` uses TLS but accepts unverified certificates: the broker
/// is expected on a trusted network, and the token, not the
/// certificate, is the credential.
#[derive(Debug)]
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, tungstenite::Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    connected: AtomicBool,
    endpoint: String,
}

impl WebSocketTransport {
    /// Connects and completes the login handshake.
    pub async fn connect(endpoint: &str, token: &str) -> Result<Self, TransportError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);

        let connector = if endpoint.starts_with("wss://") {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (ws, _) = tokio_tungstenite::connect_async_tls_with_config(
            endpoint,
            Some(ws_config),
            false,
            connector,
        )
        .await?;
        let (sink, stream) = ws.split();

        let transport = Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            connected: AtomicBool::new(false),
            endpoint: endpoint.to_owned(),
        };

        transport.send_raw(&login_frame(token)?).await?;
        let reply = transport.recv_raw().await?;
        check_login_reply(endpoint, &reply)?;
        transport.connected.store(true, Ordering::Relaxed);
        debug!(endpoint = %endpoint, "WebSocket connected");
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

    pub async fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let mut sink = self.sink.lock().await;
        let _ = sink.send(tungstenite::Message::Close(None)).await;
        let _ = sink.close().await;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_raw(&self, frame: &Frame) -> Result<(), TransportError> {
        let json = frame.to_json()?;
        trace!(frame = %frame, "WebSocket send");
        let mut sink = self.sink.lock().await;
        sink.send(tungstenite::Message::Text(json.into())).await?;
        Ok(())
    }

    async fn recv_raw(&self) -> Result<Frame, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Frame::from_json(&text)?);
                }
                Some(Ok(tungstenite::Message::Binary(buf))) => {
                    return Ok(Frame::from_bytes(&buf)?);
                }
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {
                    // tungstenite answers pings on the next write.
                    continue;
                }
                Some(Ok(tungstenite::Message::Close(_))) => {
                    debug!(endpoint = %self.endpoint, "WebSocket closed by peer");
                    return Err(TransportError::Closed);
                }
                Some(Ok(tungstenite::Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    warn!(endpoint = %self.endpoint, error = %e, "WebSocket read error");
                    return Err(TransportError::Ws(e));
                }
                None => return Err(TransportError::Closed),
            }
        }
    }
}
