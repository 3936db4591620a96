//! Correlation of outbound requests with their responses.
//!
//! Every pending entry is a oneshot sender; resolving it removes it from the
//! map, so an entry resolves at most once no matter which of response,
//! cancellation or disconnect comes first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, StreamingError};
use crate::message::ReceiveResponse;
use crate::protocol::StreamId;

type Pending = HashMap<StreamId, oneshot::Sender<Result<ReceiveResponse>>>;

/// Table of requests awaiting a response.
#[derive(Clone)]
pub struct RequestManager {
    pending: Arc<Mutex<Pending>>,
    closed: CancellationToken,
}

impl RequestManager {
    /// Create a manager whose waits also end when `closed` is cancelled.
    pub fn new(closed: CancellationToken) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed,
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a request.
    ///
    /// # Errors
    ///
    /// `MissingId` for the nil id, `DuplicateStream` if `id` is pending.
    pub fn create(&self, id: StreamId) -> Result<PendingRequest> {
        if id.is_nil() {
            return Err(StreamingError::MissingId);
        }
        let mut pending = self.pending();
        if pending.contains_key(&id) {
            return Err(StreamingError::DuplicateStream(id));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(PendingRequest {
            id,
            rx,
            manager: self.clone(),
        })
    }

    /// Resolve the request `id` with its response.
    ///
    /// Returns `false` if nothing is pending under `id`.
    pub fn signal_response(&self, id: StreamId, response: ReceiveResponse) -> bool {
        match self.pending().remove(&id) {
            Some(tx) => tx.send(Ok(response)).is_ok(),
            None => {
                debug!(%id, "no pending request for response");
                false
            }
        }
    }

    /// Reject the request `id` with `Cancelled`.
    pub fn cancel(&self, id: StreamId) -> bool {
        match self.pending().remove(&id) {
            Some(tx) => tx.send(Err(StreamingError::Cancelled)).is_ok(),
            None => false,
        }
    }

    /// Reject every pending request with `Disconnected`.
    pub fn reject_all(&self) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "rejecting pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(StreamingError::Disconnected));
        }
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Check if `id` is awaiting a response.
    pub fn is_pending(&self, id: &StreamId) -> bool {
        self.pending().contains_key(id)
    }

    fn forget(&self, id: &StreamId) {
        self.pending().remove(id);
    }
}

/// Handle to one request awaiting its response.
///
/// Dropping the handle forgets the request, so a response arriving later
/// is ignored.
pub struct PendingRequest {
    id: StreamId,
    rx: oneshot::Receiver<Result<ReceiveResponse>>,
    manager: RequestManager,
}

impl PendingRequest {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Wait for the response.
    ///
    /// # Errors
    ///
    /// `Cancelled` when `cancel` fires first, `Disconnected` when the
    /// connection goes down first.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<ReceiveResponse> {
        let closed = self.manager.closed.clone();

        tokio::select! {
            biased;
            result = &mut self.rx => result.unwrap_or(Err(StreamingError::Disconnected)),
            _ = cancel.cancelled() => {
                self.manager.cancel(self.id);
                debug!(id = %self.id, "request cancelled");
                Err(StreamingError::Cancelled)
            }
            _ = closed.cancelled() => Err(StreamingError::Disconnected),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.manager.forget(&self.id);
    }
}
