//! Transport module - the byte-stream connection under the protocol.
//!
//! The protocol only needs an ordered, reliable byte stream. [`Transport`]
//! is that contract; adapters exist for:
//! - any tokio `AsyncRead`/`AsyncWrite` pair ([`StreamTransport`])
//! - Unix Domain Sockets (Linux/macOS) and Named Pipes (Windows)
//! - WebSocket connections ([`WebSocketTransport`])

mod pipe;
mod stream;
mod websocket;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use pipe::{generate_pipe_path, pipe_path, PipeListener, PipeStream, PipeTransport};
pub use stream::StreamTransport;
pub use websocket::WebSocketTransport;

/// Ordered byte-stream connection.
///
/// `send` is only ever called by one task at a time; `receive` only by the
/// receive loop. Implementations still have to be `Sync` since both run
/// concurrently against the same transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `data`, returning the number of bytes accepted.
    async fn send(&self, data: &[u8]) -> Result<usize>;

    /// Read up to `max` bytes. An empty buffer means the peer closed.
    async fn receive(&self, max: usize) -> Result<Bytes>;

    /// Check if the connection is still open.
    fn is_connected(&self) -> bool;

    /// Close the connection. Idempotent.
    async fn close(&self);
}
