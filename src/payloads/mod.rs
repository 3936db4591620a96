//! Payload layer - from logical payloads to frames and back.
//!
//! - [`PayloadSender`] splits payloads into frames and owns the writer task
//! - [`PayloadReceiver`] runs the receive loop over the transport
//! - [`PayloadAssemblerManager`] reassembles frames per id
//! - [`StreamRegistry`] holds attached body streams by id
//! - [`RequestManager`] correlates responses with outbound requests

mod assembler;
mod assembler_manager;
mod receiver;
mod request_manager;
mod sender;
mod stream_registry;

pub use assembler::{Assembled, PayloadAssembler, DEFAULT_MAX_PAYLOAD_SIZE};
pub use assembler_manager::{CompletedPayload, PayloadAssemblerManager};
pub use receiver::{PayloadReceiver, PayloadSink, DEFAULT_READ_BUFFER_SIZE};
pub use request_manager::{PendingRequest, RequestManager};
pub use sender::{
    PayloadSender, SenderConfig, DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_MAX_PENDING_FRAMES,
};
pub use stream_registry::{
    StreamRegistry, DEFAULT_MAX_UNCLAIMED_BYTES, DEFAULT_MAX_UNCLAIMED_STREAMS,
};
