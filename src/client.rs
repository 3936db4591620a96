//! Client builder and the client side of a connection.
//!
//! The [`ClientBuilder`] provides a fluent API for the request handler and
//! connection settings. [`Client`] dials the peer, then runs the
//! connection until either side disconnects. Both peers can send requests;
//! "client" only names the side that dialed.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::{Client, StreamingRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .max_frame_size(8192)
//!         .connect_websocket("ws://127.0.0.1:3978/api/messages")
//!         .await?;
//!
//!     let mut request = StreamingRequest::post("/api/messages");
//!     request.set_body_text("hello");
//!     let response = client.send(request).await?;
//!     println!("{}", response.status_code);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;
use crate::handler::{RequestHandler, RequestRouter};
use crate::message::{ReceiveResponse, StreamingRequest};
use crate::transport::{PipeStream, Transport, WebSocketTransport};

/// Builder for configuring and connecting a client.
pub struct ClientBuilder {
    handler: Option<Arc<dyn RequestHandler>>,
    config: ConnectionConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            handler: None,
            config: ConnectionConfig::default(),
        }
    }

    /// Set the handler for requests the peer sends to this side.
    ///
    /// Without one, every inbound request is answered with 404.
    pub fn handler<H: RequestHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the maximum frame body size for outgoing payloads.
    ///
    /// Default: 4096
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the maximum size of a reassembled inbound payload.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the number of bytes requested per transport read.
    ///
    /// Default: 16 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the maximum number of concurrent handlers.
    ///
    /// When this limit is reached, new requests are answered with 503.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// When this limit is reached, sends wait until backpressure clears or
    /// timeout.
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.sender.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.sender.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.sender.backpressure_timeout = timeout;
        self
    }

    /// Start the connection over an already-open transport.
    pub fn connect<T: Transport + 'static>(self, transport: T) -> Client {
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(RequestRouter::new()));
        Client {
            connection: Connection::start(Arc::new(transport), handler, self.config),
        }
    }

    /// Connect to a pipe created by a server.
    pub async fn connect_pipe(self, path: &str) -> Result<Client> {
        let stream = PipeStream::connect(path).await?;
        debug!(path, "connected to pipe");
        Ok(self.connect(stream.into_transport()))
    }

    /// Connect to a `ws://` or `wss://` url.
    pub async fn connect_websocket(self, url: &str) -> Result<Client> {
        let transport = WebSocketTransport::connect(url).await?;
        debug!(url, "connected to websocket");
        Ok(self.connect(transport))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected client.
///
/// Use `send()` to make requests and `wait_for_shutdown()` to block until
/// the connection closes.
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Send a request and wait for its response.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.connection.send(request).await
    }

    /// Send a request that can be abandoned through `cancel`.
    pub async fn send_with_cancellation(
        &self,
        request: StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse> {
        self.connection.send_with_cancellation(request, cancel).await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Disconnect, rejecting every pending request.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Wait for shutdown (local disconnect, peer close or transport failure).
    ///
    /// This consumes the client and blocks until the connection closes.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        self.connection.closed().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::message::StreamingResponse;

    #[test]
    fn test_builder_default() {
        let builder = ClientBuilder::default();
        assert!(builder.handler.is_none());
        assert_eq!(builder.config.max_frame_size, 4096);
    }

    #[test]
    fn test_builder_handler() {
        let builder =
            Client::builder().handler(handler_fn(|_| async { Ok(StreamingResponse::ok()) }));
        assert!(builder.handler.is_some());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .max_frame_size(1024)
            .max_payload_size(1 << 20)
            .read_buffer_size(4096)
            .max_concurrent_handlers(512)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10));

        assert_eq!(builder.config.max_frame_size, 1024);
        assert_eq!(builder.config.max_payload_size, 1 << 20);
        assert_eq!(builder.config.read_buffer_size, 4096);
        assert_eq!(builder.config.max_concurrent_handlers, 512);
        assert_eq!(builder.config.sender.max_pending_frames, 2048);
        assert_eq!(builder.config.sender.channel_capacity, 512);
        assert_eq!(
            builder.config.sender.backpressure_timeout,
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_connect_pipe_missing() {
        let path = crate::transport::pipe_path("streamwire-no-such-pipe");
        assert!(Client::builder().connect_pipe(&path).await.is_err());
    }
}
