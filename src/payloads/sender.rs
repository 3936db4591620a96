//! Chunking of logical payloads into frames, and the writer task.
//!
//! # Architecture
//!
//! ```text
//! send_payload 1 ─┐
//! send_payload 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Transport::send
//! send_payload N ─┘
//! ```
//!
//! The writer task is the only caller of [`Transport::send`]. Each frame is
//! written as two sends, header then body, so frames of different payloads
//! interleave but never split each other.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::backpressure::{BackpressureController, BackpressureGuard};
use crate::error::{Result, StreamingError};
use crate::protocol::{
    Header, PayloadType, StreamId, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, MAX_PAYLOAD_LENGTH,
};
use crate::transport::Transport;

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum queued frames before senders wait.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// How long a sender waits for queue space.
    pub backpressure_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// A frame ready to be written.
#[derive(Debug)]
struct OutboundFrame {
    header: [u8; HEADER_SIZE],
    payload: Bytes,
    /// Set on the last frame of a payload.
    sent: Option<oneshot::Sender<()>>,
    _slot: BackpressureGuard,
}

/// Handle for sending payloads through the writer task.
///
/// Cheap to clone; every clone feeds the same writer.
#[derive(Clone)]
pub struct PayloadSender {
    tx: mpsc::Sender<OutboundFrame>,
    backpressure: BackpressureController,
    max_frame_size: usize,
    closed: CancellationToken,
}

impl PayloadSender {
    /// Spawn the writer task over `transport`.
    ///
    /// `max_frame_size` is clamped to what a header can announce. The writer
    /// stops when `closed` is cancelled, and cancels it itself if the
    /// transport fails.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        max_frame_size: usize,
        config: SenderConfig,
        closed: CancellationToken,
    ) -> (Self, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let backpressure =
            BackpressureController::with_timeout(config.max_pending_frames, config.backpressure_timeout);

        let sender = Self {
            tx,
            backpressure,
            max_frame_size: max_frame_size.clamp(1, MAX_PAYLOAD_LENGTH as usize),
            closed: closed.clone(),
        };
        let task = tokio::spawn(writer_loop(rx, transport, closed));

        (sender, task)
    }

    /// Spawn the writer task with default frame size and configuration.
    pub fn spawn_default(
        transport: Arc<dyn Transport>,
        closed: CancellationToken,
    ) -> (Self, JoinHandle<Result<()>>) {
        Self::spawn(transport, DEFAULT_MAX_FRAME_SIZE, SenderConfig::default(), closed)
    }

    /// Check if the writer is still accepting frames.
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Number of frames queued but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.backpressure.pending_count()
    }

    /// Number of frames a body of `len` bytes is split into.
    pub fn frame_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_frame_size).max(1)
    }

    /// Send one logical payload, returning once its last frame was written.
    ///
    /// A payload sent while disconnected is dropped without error.
    ///
    /// # Errors
    ///
    /// `Disconnected` if the connection goes down before the last frame is
    /// written, `BackpressureTimeout` if the queue stays full.
    pub async fn send_payload(&self, payload_type: PayloadType, id: StreamId, body: Bytes) -> Result<()> {
        if !self.is_connected() {
            debug!(%id, ?payload_type, "not connected, dropping payload");
            return Ok(());
        }

        let frames = self.frame_count(body.len());
        let mut written = None;

        for index in 0..frames {
            let start = index * self.max_frame_size;
            let end = (start + self.max_frame_size).min(body.len());
            let chunk = body.slice(start..end);
            let last = index + 1 == frames;

            let header = Header::new(payload_type, chunk.len() as u32, id, last);
            let slot = tokio::select! {
                slot = self.backpressure.reserve() => slot?,
                _ = self.closed.cancelled() => return Err(StreamingError::Disconnected),
            };

            let sent = if last {
                let (tx, rx) = oneshot::channel();
                written = Some(rx);
                Some(tx)
            } else {
                None
            };

            let frame = OutboundFrame {
                header: header.encode()?,
                payload: chunk,
                sent,
                _slot: slot,
            };
            self.tx
                .send(frame)
                .await
                .map_err(|_| StreamingError::Disconnected)?;
        }

        match written {
            Some(rx) => rx.await.map_err(|_| StreamingError::Disconnected),
            None => Ok(()),
        }
    }
}

/// Main writer loop - receives frames and writes them to the transport.
async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    transport: Arc<dyn Transport>,
    closed: CancellationToken,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => return Ok(()),
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => return Ok(()),
            },
        };

        if let Err(e) = write_frame(transport.as_ref(), &frame).await {
            error!(error = %e, "frame write failed, closing connection");
            closed.cancel();
            return Err(e);
        }

        if let Some(sent) = frame.sent {
            let _ = sent.send(());
        }
    }
}

async fn write_frame(transport: &dyn Transport, frame: &OutboundFrame) -> Result<()> {
    send_exact(transport, &frame.header).await?;
    if !frame.payload.is_empty() {
        send_exact(transport, &frame.payload).await?;
    }
    Ok(())
}

async fn send_exact(transport: &dyn Transport, data: &[u8]) -> Result<()> {
    let written = transport.send(data).await?;
    if written != data.len() {
        return Err(StreamingError::LengthMismatch {
            expected: data.len(),
            actual: written,
        });
    }
    Ok(())
}
