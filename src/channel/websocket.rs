//! Channel WebSocket connection and frame transport

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::ClientError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Text-frame transport underneath the channel.
///
/// `recv` yields `Ok(None)` once the peer has closed the connection.
pub trait Transport: Send + 'static {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), ClientError>> + Send;
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, ClientError>> + Send;
}

/// Build the Engine.IO WebSocket endpoint from the server origin.
pub fn socket_endpoint(socket_url: &str) -> Result<String, ClientError> {
    let mut url = url::Url::parse(socket_url)
        .map_err(|e| ClientError::Validation(format!("invalid socket url '{}': {}", socket_url, e)))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ClientError::Validation(format!(
                "unsupported socket url scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Validation(format!("cannot use scheme {}", scheme)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

pub struct ChannelSocket {
    stream: WsStream,
}

impl ChannelSocket {
    /// Connect to the socket.io WebSocket endpoint.
    ///
    /// Auth happens afterwards in the Socket.IO CONNECT packet, not on the upgrade.
    pub async fn connect(socket_url: &str) -> Result<Self, ClientError> {
        let ws_url = socket_endpoint(socket_url)?;

        tracing::info!("Connecting WebSocket to {}", ws_url);

        let (stream, response) = connect_async(&ws_url)
            .await
            .map_err(|e| ClientError::Transport(format!("WebSocket connection failed: {}", e)))?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }
}

impl Transport for ChannelSocket {
    async fn send(&mut self, frame: String) -> Result<(), ClientError> {
        tracing::debug!("WS send: {}", frame);
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to send WebSocket message: {}", e)))
    }

    /// Receive the next text frame, answering WebSocket-level pings.
    async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream.send(Message::Pong(data)).await.map_err(|e| {
                        ClientError::Transport(format!("Failed to send pong: {}", e))
                    })?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(ClientError::Transport(format!("WebSocket receive error: {}", e)));
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}
