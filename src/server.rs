//! Server builder and the accepting side of a connection.
//!
//! A server waits for exactly one peer, then behaves like any other
//! connection: both sides may send requests.
//!
//! ```ignore
//! use streamwire::{handler::{handler_fn, RequestRouter}, Server, StreamingResponse};
//!
//! let mut router = RequestRouter::new();
//! router.register("GET", "/status", handler_fn(|_| async { Ok(StreamingResponse::ok()) }));
//!
//! let server = Server::builder().handler(router).start_pipe(&path).await?;
//! server.wait_for_shutdown().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;
use crate::handler::{RequestHandler, RequestRouter};
use crate::message::{ReceiveResponse, StreamingRequest};
use crate::transport::{PipeListener, Transport, WebSocketTransport};

/// Builder for configuring and starting a server.
pub struct ServerBuilder {
    handler: Option<Arc<dyn RequestHandler>>,
    config: ConnectionConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            handler: None,
            config: ConnectionConfig::default(),
        }
    }

    /// Set the handler for inbound requests. Defaults to answering 404.
    pub fn handler<H: RequestHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replace the whole connection configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.sender.max_pending_frames = limit;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.sender.channel_capacity = capacity;
        self
    }

    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.sender.backpressure_timeout = timeout;
        self
    }

    /// Serve an already-accepted transport.
    pub fn start<T: Transport + 'static>(self, transport: T) -> Server {
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(RequestRouter::new()));
        Server {
            connection: Connection::start(Arc::new(transport), handler, self.config),
        }
    }

    /// Create the pipe at `path` and serve the first peer that connects.
    pub async fn start_pipe(self, path: &str) -> Result<Server> {
        let listener = PipeListener::bind(path).await?;
        info!(path = listener.path(), "waiting for peer");
        let stream = listener.accept().await?;
        Ok(self.start(stream.into_transport()))
    }

    /// Complete the WebSocket handshake on an accepted TCP stream and serve it.
    pub async fn start_websocket(self, stream: TcpStream) -> Result<Server> {
        let peer = stream.peer_addr().ok();
        let transport = WebSocketTransport::accept(stream).await?;
        info!(?peer, "websocket peer connected");
        Ok(self.start(transport))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A server with its peer connected.
pub struct Server {
    connection: Connection,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Send a request to the connected peer.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.connection.send(request).await
    }

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

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Block until the connection closes.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        self.connection.closed().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = Server::builder()
            .max_frame_size(2048)
            .max_concurrent_handlers(4)
            .backpressure_timeout(Duration::from_millis(500));

        assert!(builder.handler.is_none());
        assert_eq!(builder.config.max_frame_size, 2048);
        assert_eq!(builder.config.max_concurrent_handlers, 4);
        assert_eq!(
            builder.config.sender.backpressure_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_builder_replaces_config() {
        let builder = Server::builder().config(ConnectionConfig::default().read_buffer_size(128));
        assert_eq!(builder.config.read_buffer_size, 128);
    }
}
