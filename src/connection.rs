//! One live connection and the tasks that run it.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐  CompletedPayload  ┌───────────────┐
//! Transport ────► │ Receive Task │ ─────────────────► │ Dispatch Task │ ──► handlers
//!                 └──────────────┘                    └───────────────┘
//!                                                             │
//! send / handlers ──► PayloadSender ──► Writer Task ──► Transport
//! ```
//!
//! The receive task owns the frame buffer, the assembler manager and the
//! stream registry. Shutdown is a single [`CancellationToken`]: cancelling
//! it stops the writer and the receive loop, after which the dispatch task
//! drains what was already assembled and rejects whatever is still pending.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{ProtocolAdapter, DEFAULT_MAX_CONCURRENT_HANDLERS};
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::message::{ReceiveResponse, StreamingRequest};
use crate::payloads::{
    PayloadAssemblerManager, PayloadReceiver, PayloadSender, RequestManager, SenderConfig,
    DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::Transport;

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest body written in a single frame.
    pub max_frame_size: usize,
    /// Largest reassembled payload accepted from the peer.
    pub max_payload_size: usize,
    /// Bytes requested per transport read.
    pub read_buffer_size: usize,
    /// Handlers allowed to run at once.
    pub max_concurrent_handlers: usize,
    pub sender: SenderConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            sender: SenderConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.sender.max_pending_frames = limit;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.sender.channel_capacity = capacity;
        self
    }

    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.sender.backpressure_timeout = timeout;
        self
    }
}

/// A running connection.
///
/// Requests can be sent from any task through `&self`; inbound requests go
/// to the handler given at start.
pub struct Connection {
    adapter: ProtocolAdapter,
    transport: Arc<dyn Transport>,
    /// Stops the writer and the receive loop.
    closed: CancellationToken,
    /// Cancelled once everything assembled before shutdown was dispatched.
    finished: CancellationToken,
}

impl Connection {
    /// Spawn the writer, receive and dispatch tasks over `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn RequestHandler>,
        config: ConnectionConfig,
    ) -> Self {
        let closed = CancellationToken::new();
        let finished = CancellationToken::new();

        let (sender, writer_task) = PayloadSender::spawn(
            transport.clone(),
            config.max_frame_size,
            config.sender.clone(),
            closed.clone(),
        );
        let requests = RequestManager::new(finished.clone());
        let adapter = ProtocolAdapter::new(sender, requests.clone(), handler)
            .with_max_concurrent_handlers(config.max_concurrent_handlers);

        tokio::spawn(async move {
            match writer_task.await {
                Ok(Ok(())) => debug!("writer task stopped"),
                Ok(Err(e)) => warn!(error = %e, "writer task failed"),
                Err(e) => warn!(error = %e, "writer task aborted"),
            }
        });

        let (completed_tx, mut completed_rx) = mpsc::unbounded_channel();
        let mut manager =
            PayloadAssemblerManager::new(completed_tx).with_max_payload_size(config.max_payload_size);
        let mut receiver = PayloadReceiver::new(transport.clone(), config.read_buffer_size);
        let receive_closed = closed.clone();
        tokio::spawn(async move {
            match receiver.run(&mut manager, &receive_closed).await {
                Ok(()) => debug!("receive loop ended"),
                Err(e) => warn!(error = %e, "receive loop failed"),
            }
            manager.on_disconnected();
            receive_closed.cancel();
            // Dropping the manager closes the completed channel
        });

        let dispatcher = adapter.clone();
        let dispatch_transport = transport.clone();
        let dispatch_finished = finished.clone();
        tokio::spawn(async move {
            while let Some(completed) = completed_rx.recv().await {
                dispatcher.on_payload(completed);
            }
            requests.reject_all();
            dispatch_transport.close().await;
            dispatch_finished.cancel();
            debug!("connection closed");
        });

        Self {
            adapter,
            transport,
            closed,
            finished,
        }
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// `Disconnected` if the connection is down or goes down before the
    /// response arrives.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.adapter
            .send_request(request, &CancellationToken::new())
            .await
    }

    /// Send a request that gives up with `Cancelled` once `cancel` fires.
    ///
    /// Frames already written are not retracted; a late response is dropped.
    pub async fn send_with_cancellation(
        &self,
        request: StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse> {
        self.adapter.send_request(request, cancel).await
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected() && self.transport.is_connected()
    }

    /// Number of sent requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.adapter.requests().pending_count()
    }

    /// Tear the connection down. Safe to call more than once.
    ///
    /// Every pending request is rejected with `Disconnected` before this
    /// returns.
    pub async fn disconnect(&self) {
        if !self.closed.is_cancelled() {
            debug!("disconnecting");
        }
        self.closed.cancel();
        self.adapter.requests().reject_all();
        self.transport.close().await;
    }

    /// Wait until the connection has fully shut down.
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }

    /// Token cancelled when the connection starts shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
