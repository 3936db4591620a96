//! [`Transport`] over a `tokio-tungstenite` WebSocket.
//!
//! Outbound bytes go out as one binary message per `send`. Inbound message
//! boundaries are ignored: binary and text messages are concatenated into
//! the byte stream the frame buffer consumes.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::Transport;
use crate::error::Result;

struct Inbound<S> {
    stream: SplitStream<WebSocketStream<S>>,
    leftover: BytesMut,
}

/// WebSocket transport.
pub struct WebSocketTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    inbound: Mutex<Inbound<S>>,
    connected: AtomicBool,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established WebSocket.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            inbound: Mutex::new(Inbound {
                stream,
                leftover: BytesMut::new(),
            }),
            connected: AtomicBool::new(true),
        }
    }

    /// Complete the server side of the handshake on an accepted socket.
    pub async fn accept(stream: S) -> Result<Self> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        Ok(Self::new(ws))
    }
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Connect to a `ws://` or `wss://` url.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self::new(ws))
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&self, data: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Ok(0);
        }
        let message = WsMessage::Binary(Bytes::copy_from_slice(data));
        if let Err(e) = self.sink.lock().await.send(message).await {
            self.connected.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(data.len())
    }

    async fn receive(&self, max: usize) -> Result<Bytes> {
        let max = max.max(1);
        let mut inbound = self.inbound.lock().await;

        loop {
            if !inbound.leftover.is_empty() {
                let n = inbound.leftover.len().min(max);
                return Ok(inbound.leftover.split_to(n).freeze());
            }
            if !self.is_connected() {
                return Ok(Bytes::new());
            }

            match inbound.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => inbound.leftover.extend_from_slice(&data),
                Some(Ok(WsMessage::Text(text))) => {
                    inbound.leftover.extend_from_slice(text.as_str().as_bytes())
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("websocket closed by peer");
                    self.connected.store(false, Ordering::Release);
                    return Ok(Bytes::new());
                }
                // tungstenite queues the pong reply itself
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(e.into());
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = self.sink.lock().await.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let transport = WebSocketTransport::accept(tcp).await.unwrap();
            let first = transport.receive(3).await.unwrap();
            let rest = transport.receive(64).await.unwrap();
            transport.send(b"pong").await.unwrap();
            (first, rest, transport)
        });

        let client = WebSocketTransport::connect(&url).await.unwrap();
        client.send(b"hello").await.unwrap();

        let (first, rest, server_transport) = server.await.unwrap();
        assert_eq!(&first[..], b"hel");
        assert_eq!(&rest[..], b"lo");
        assert_eq!(&client.receive(64).await.unwrap()[..], b"pong");

        client.close().await;
        assert!(!client.is_connected());
        assert!(server_transport.receive(64).await.unwrap().is_empty());
        assert!(!server_transport.is_connected());
    }
}
