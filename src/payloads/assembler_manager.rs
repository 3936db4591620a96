//! Routes received frames to per-id assemblers.
//!
//! Finished envelopes are turned into [`ReceiveRequest`] / [`ReceiveResponse`]
//! values and pushed to the completion channel. Their content streams are
//! claimed from the [`StreamRegistry`] by id, so a body may arrive before or
//! after the envelope that references it.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::assembler::{Assembled, PayloadAssembler, DEFAULT_MAX_PAYLOAD_SIZE};
use super::receiver::PayloadSink;
use super::stream_registry::StreamRegistry;
use crate::error::Result;
use crate::message::{ContentStream, ReceiveRequest, ReceiveResponse};
use crate::protocol::{Header, PayloadType, StreamDescription, StreamId};
use crate::stream::SubscribableStream;

/// A fully received envelope.
#[derive(Debug)]
pub enum CompletedPayload {
    Request(ReceiveRequest),
    Response(StreamId, ReceiveResponse),
}

/// Assemblers for every id currently being received.
pub struct PayloadAssemblerManager {
    registry: StreamRegistry,
    assemblers: HashMap<StreamId, PayloadAssembler>,
    completed_tx: mpsc::UnboundedSender<CompletedPayload>,
    max_payload_size: usize,
}

impl PayloadAssemblerManager {
    /// Create a manager that reports finished envelopes on `completed_tx`.
    pub fn new(completed_tx: mpsc::UnboundedSender<CompletedPayload>) -> Self {
        Self {
            registry: StreamRegistry::new(),
            assemblers: HashMap::new(),
            completed_tx,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the reassembly size limit for new assemblers.
    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Bound completed bodies that no envelope has claimed.
    pub fn with_unclaimed_limits(mut self, max_streams: usize, max_bytes: usize) -> Self {
        self.registry = StreamRegistry::with_limits(max_streams, max_bytes);
        self
    }

    /// Open an assembler for the first frame of a payload.
    ///
    /// Returns `None` for cancel signals and while `header.id` is already
    /// being assembled.
    pub fn get_payload_stream(&mut self, header: &Header) -> Option<SubscribableStream> {
        if header.payload_type.is_cancel() {
            return None;
        }
        if self.assemblers.contains_key(&header.id) {
            warn!(id = %header.id, payload_type = ?header.payload_type, "duplicate payload id, ignoring");
            return None;
        }

        let created = match header.payload_type {
            PayloadType::Stream => {
                let stream = self.registry.get_or_create(header.id);
                PayloadAssembler::with_stream(header, stream)
            }
            _ => PayloadAssembler::new(header),
        };
        let mut assembler = match created {
            Ok(assembler) => assembler.max_payload_size(self.max_payload_size),
            Err(e) => {
                warn!(error = %e, "cannot assemble payload");
                return None;
            }
        };

        let stream = assembler.get_payload_stream();
        self.assemblers.insert(header.id, assembler);
        Some(stream)
    }

    /// Feed one frame body.
    ///
    /// # Errors
    ///
    /// Only connection-fatal errors are returned. A payload that fails for
    /// any other reason is logged and dropped.
    pub fn on_receive(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        match header.payload_type {
            PayloadType::CancelStream => {
                debug!(id = %header.id, "cancel stream");
                if let Some(mut assembler) = self.assemblers.remove(&header.id) {
                    assembler.close();
                }
                self.registry.close(&header.id);
                return Ok(());
            }
            PayloadType::CancelAll => {
                debug!("cancel all streams");
                self.close_all();
                return Ok(());
            }
            _ => {}
        }

        if !self.assemblers.contains_key(&header.id) && self.get_payload_stream(header).is_none() {
            return Ok(());
        }
        let Some(assembler) = self.assemblers.get_mut(&header.id) else {
            return Ok(());
        };

        match assembler.on_receive(header, body) {
            Ok(None) => Ok(()),
            Ok(Some(assembled)) => {
                self.assemblers.remove(&header.id);
                self.complete(header.id, assembled);
                Ok(())
            }
            Err(e) => {
                if let Some(mut assembler) = self.assemblers.remove(&header.id) {
                    assembler.close();
                    for orphan in assembler.take_orphaned_streams() {
                        self.registry.release(&orphan);
                    }
                }
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(id = %header.id, error = %e, "dropping payload");
                Ok(())
            }
        }
    }

    fn complete(&mut self, id: StreamId, assembled: Assembled) {
        let completed = match assembled {
            Assembled::Stream => {
                self.registry.mark_completed(&id);
                return;
            }
            Assembled::Request(envelope) => CompletedPayload::Request(ReceiveRequest {
                id,
                verb: envelope.verb,
                path: envelope.path,
                streams: self.claim_streams(envelope.streams),
            }),
            Assembled::Response(envelope) => CompletedPayload::Response(
                id,
                ReceiveResponse {
                    status_code: envelope.status_code,
                    streams: self.claim_streams(envelope.streams),
                },
            ),
        };

        if self.completed_tx.send(completed).is_err() {
            debug!(%id, "completion receiver gone, dropping payload");
        }
    }

    fn claim_streams(&mut self, descriptions: Vec<StreamDescription>) -> Vec<ContentStream> {
        descriptions
            .into_iter()
            .map(|d| {
                let stream = self.registry.claim(d.id);
                ContentStream::new(d.id, d.content_type, d.length, stream)
            })
            .collect()
    }

    fn close_all(&mut self) {
        for (_, mut assembler) in self.assemblers.drain() {
            assembler.close();
        }
        self.registry.close_all();
    }

    /// End every open stream and forget all state.
    pub fn on_disconnected(&mut self) {
        self.close_all();
    }

    /// Number of payloads currently being assembled.
    pub fn active_count(&self) -> usize {
        self.assemblers.len()
    }

    /// The registry of body streams.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }
}

impl PayloadSink for PayloadAssemblerManager {
    fn get_payload_stream(&mut self, header: &Header) -> Option<SubscribableStream> {
        PayloadAssemblerManager::get_payload_stream(self, header)
    }

    fn on_receive(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        PayloadAssemblerManager::on_receive(self, header, body)
    }

    fn on_disconnected(&mut self) {
        PayloadAssemblerManager::on_disconnected(self)
    }
}
