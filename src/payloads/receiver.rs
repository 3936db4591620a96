//! The receive loop: transport bytes in, frames out to a [`PayloadSink`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, StreamingError};
use crate::protocol::{Frame, FrameBuffer, PayloadType, StreamId, Header};
use crate::stream::SubscribableStream;
use crate::transport::Transport;

/// Default number of bytes requested per transport read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Consumer of received frames.
pub trait PayloadSink: Send {
    /// Called on the first frame of a payload. `None` drops the payload.
    fn get_payload_stream(&mut self, header: &Header) -> Option<SubscribableStream>;

    /// Called for every frame of an accepted payload and for cancel signals.
    ///
    /// An error ends the receive loop.
    fn on_receive(&mut self, header: &Header, body: &[u8]) -> Result<()>;

    /// Called once the loop has ended.
    fn on_disconnected(&mut self);
}

/// Reads the transport and splits the byte stream into frames.
pub struct PayloadReceiver {
    transport: Arc<dyn Transport>,
    frames: FrameBuffer,
    read_buffer_size: usize,
    /// Payloads with frames still to come.
    open: HashSet<StreamId>,
    /// Payloads the sink refused; their later frames are skipped.
    dropped: HashSet<StreamId>,
}

impl PayloadReceiver {
    pub fn new(transport: Arc<dyn Transport>, read_buffer_size: usize) -> Self {
        Self {
            transport,
            frames: FrameBuffer::new(),
            read_buffer_size: read_buffer_size.max(1),
            open: HashSet::new(),
            dropped: HashSet::new(),
        }
    }

    /// Reject frames whose body is longer than `max`.
    pub fn with_max_frame_payload(mut self, max: u32) -> Self {
        self.frames = FrameBuffer::with_max_payload(max);
        self
    }

    /// Receive until the transport closes or `closed` is cancelled.
    ///
    /// Does not call [`PayloadSink::on_disconnected`]; the owner of the
    /// loop does, whatever the outcome.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if the transport closes in the middle of a frame,
    /// plus any error from the transport, the frame buffer or the sink.
    pub async fn run<S: PayloadSink>(&mut self, sink: &mut S, closed: &CancellationToken) -> Result<()> {
        loop {
            let data = tokio::select! {
                biased;
                _ = closed.cancelled() => return Ok(()),
                data = self.transport.receive(self.read_buffer_size) => data?,
            };

            if data.is_empty() {
                if let Some((expected, actual)) = self.frames.incomplete_frame() {
                    return Err(StreamingError::LengthMismatch { expected, actual });
                }
                debug!("transport closed");
                return Ok(());
            }

            for frame in self.frames.push(&data)? {
                self.dispatch(sink, &frame)?;
            }
        }
    }

    fn dispatch<S: PayloadSink>(&mut self, sink: &mut S, frame: &Frame) -> Result<()> {
        let header = &frame.header;
        let id = header.id;

        match header.payload_type {
            PayloadType::CancelStream => {
                self.open.remove(&id);
                return sink.on_receive(header, frame.payload());
            }
            PayloadType::CancelAll => {
                self.open.clear();
                return sink.on_receive(header, frame.payload());
            }
            _ => {}
        }

        if self.dropped.contains(&id) {
            if header.end {
                self.dropped.remove(&id);
            }
            return Ok(());
        }

        if !self.open.contains(&id) {
            if sink.get_payload_stream(header).is_none() {
                warn!(%id, payload_type = ?header.payload_type, "payload refused, dropping its frames");
                if !header.end {
                    self.dropped.insert(id);
                }
                return Ok(());
            }
            self.open.insert(id);
        }

        if header.end {
            self.open.remove(&id);
        }
        sink.on_receive(header, frame.payload())
    }

    /// Number of payloads with frames still to come.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
