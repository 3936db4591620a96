//! Protocol adapter - requests and responses on top of payloads.
//!
//! Outbound: `Sent -> AwaitingResponse -> {Completed | Cancelled | Disconnected}`.
//! Inbound: `Receiving -> Complete -> Dispatched -> ResponseSent`.
//! Every terminal state is final.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Result, StreamingError};
use crate::handler::RequestHandler;
use crate::message::{HttpContent, ReceiveRequest, ReceiveResponse, StreamingRequest, StreamingResponse};
use crate::payloads::{CompletedPayload, PayloadSender, RequestManager};
use crate::protocol::{PayloadType, RequestEnvelope, ResponseEnvelope, StreamDescription, StreamId};

/// Default maximum concurrent request handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Turns application messages into payloads and completed payloads into
/// handler calls and resolved requests.
#[derive(Clone)]
pub struct ProtocolAdapter {
    sender: PayloadSender,
    requests: RequestManager,
    handler: Arc<dyn RequestHandler>,
    permits: Arc<Semaphore>,
}

impl ProtocolAdapter {
    pub fn new(sender: PayloadSender, requests: RequestManager, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            sender,
            requests,
            handler,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_HANDLERS)),
        }
    }

    /// Limit how many handlers run at once.
    ///
    /// Requests over the limit are answered with 503 without reaching the
    /// handler.
    pub fn with_max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Send a request and wait for its response.
    ///
    /// The pending entry is registered before the first frame goes out, so
    /// a fast response cannot arrive unmatched.
    ///
    /// # Errors
    ///
    /// `Disconnected` if the connection is down or goes down before the
    /// response, `Cancelled` if `cancel` fires first.
    pub async fn send_request(
        &self,
        request: StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse> {
        if !self.sender.is_connected() {
            return Err(StreamingError::Disconnected);
        }

        let id = StreamId::new();
        let pending = self.requests.create(id)?;
        let (streams, bodies) = describe(request.streams);
        let envelope = RequestEnvelope {
            verb: request.verb,
            path: request.path,
            streams,
        };
        debug!(%id, verb = %envelope.verb, path = %envelope.path, "sending request");
        let encoded = match envelope.to_bytes() {
            Ok(encoded) => encoded,
            Err(e) => {
                self.requests.cancel(id);
                return Err(e);
            }
        };

        let mut written = 0;
        let sent = tokio::select! {
            biased;
            sent = self.send_message(PayloadType::Request, id, encoded, &bodies, &mut written) => Some(sent),
            _ = cancel.cancelled() => None,
        };
        match sent {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.requests.cancel(id);
                return Err(e);
            }
            None => {
                self.requests.cancel(id);
                self.abandon(id, &bodies, written);
                return Err(StreamingError::Cancelled);
            }
        }

        pending.wait(cancel).await
    }

    /// Tell the peer to drop every payload of a cancelled request that was
    /// not fully written, so its handler sees the bodies end.
    ///
    /// `written` counts finished payloads, envelope first.
    fn abandon(&self, id: StreamId, bodies: &[(StreamId, Bytes)], written: usize) {
        let unfinished: Vec<StreamId> = std::iter::once(id)
            .chain(bodies.iter().map(|(stream_id, _)| *stream_id))
            .skip(written)
            .collect();
        if unfinished.is_empty() {
            return;
        }

        debug!(%id, streams = unfinished.len(), "request cancelled mid-send");
        let sender = self.sender.clone();
        tokio::spawn(async move {
            for stream_id in unfinished {
                if let Err(e) = sender
                    .send_payload(PayloadType::CancelStream, stream_id, Bytes::new())
                    .await
                {
                    debug!(id = %stream_id, error = %e, "cancel stream not sent");
                    break;
                }
            }
        });
    }

    /// Handle a payload the receive task finished assembling.
    pub fn on_payload(&self, completed: CompletedPayload) {
        match completed {
            CompletedPayload::Request(request) => {
                let adapter = self.clone();
                match self.permits.clone().try_acquire_owned() {
                    Ok(permit) => {
                        tokio::spawn(async move {
                            // Permit is held until the response is sent
                            let _permit = permit;
                            adapter.respond(request).await
                        });
                    }
                    Err(_) => {
                        warn!(id = %request.id, path = %request.path, "handler capacity reached");
                        tokio::spawn(async move {
                            let _ = adapter
                                .send_response(request.id, StreamingResponse::service_unavailable())
                                .await;
                        });
                    }
                }
            }
            CompletedPayload::Response(id, response) => {
                debug!(%id, status = response.status_code, "response received");
                self.requests.signal_response(id, response);
            }
        }
    }

    async fn respond(&self, request: ReceiveRequest) {
        let id = request.id;
        debug!(%id, verb = %request.verb, path = %request.path, "dispatching request");

        // Spawned so a panicking handler only fails this exchange.
        let handled = tokio::spawn(self.handler.process_request(request)).await;
        let response = match handled {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(%id, error = %e, "request handler failed");
                StreamingResponse::internal_error()
            }
            Err(e) => {
                error!(%id, error = %e, "request handler panicked");
                StreamingResponse::internal_error()
            }
        };

        if let Err(e) = self.send_response(id, response).await {
            debug!(%id, error = %e, "response not sent");
        }
    }

    /// Send `response` under the id of the request it answers.
    pub async fn send_response(&self, id: StreamId, response: StreamingResponse) -> Result<()> {
        let (streams, bodies) = describe(response.streams);
        let envelope = ResponseEnvelope {
            status_code: response.status_code,
            streams,
        };
        self.send_message(PayloadType::Response, id, envelope.to_bytes()?, &bodies, &mut 0)
            .await
    }

    /// Send the envelope, then each body, counting finished payloads in
    /// `written`.
    async fn send_message(
        &self,
        payload_type: PayloadType,
        id: StreamId,
        envelope: Vec<u8>,
        bodies: &[(StreamId, Bytes)],
        written: &mut usize,
    ) -> Result<()> {
        self.sender
            .send_payload(payload_type, id, Bytes::from(envelope))
            .await?;
        *written += 1;
        for (stream_id, body) in bodies {
            self.sender
                .send_payload(PayloadType::Stream, *stream_id, body.clone())
                .await?;
            *written += 1;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    pub fn requests(&self) -> &RequestManager {
        &self.requests
    }
}

/// Give every body a fresh stream id and describe it for the envelope.
fn describe(contents: Vec<HttpContent>) -> (Vec<StreamDescription>, Vec<(StreamId, Bytes)>) {
    contents
        .into_iter()
        .map(|content| {
            let id = StreamId::new();
            let description = StreamDescription {
                id,
                content_type: content.content_type,
                length: Some(content.body.len()),
            };
            (description, (id, content.body))
        })
        .unzip()
}
