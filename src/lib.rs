//! # streamwire
//!
//! Multiplexed request/response streaming over a single byte-stream
//! connection.
//!
//! Either peer can send requests and receive responses at the same time.
//! Every logical message (a request envelope, a response envelope or one
//! attached body) is a *payload*, split into frames of at most
//! `max_frame_size` bytes, each preceded by a 48-byte ASCII header:
//!
//! ```text
//! T.LLLLLL.xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx.E\n
//! ```
//!
//! `T` is the payload type, `LLLLLL` the body length of this frame, then the
//! payload id and `1` on the last frame of the payload.
//!
//! ## Architecture
//!
//! - **Transport**: any ordered byte stream ([`transport::Transport`]);
//!   named pipes, Unix sockets and WebSockets are provided
//! - **Payloads**: chunking, the writer task, reassembly and request
//!   correlation ([`payloads`])
//! - **Adapter / Connection**: requests, responses and handler dispatch
//!
//! ## Example
//!
//! ```ignore
//! use streamwire::handler::{handler_fn, RequestRouter};
//! use streamwire::{Client, Server, StreamingRequest, StreamingResponse};
//!
//! let mut router = RequestRouter::new();
//! router.register("POST", "/api/messages", handler_fn(|request| async move {
//!     let text = match request.body() {
//!         Some(body) => body.read_as_string().await?,
//!         None => String::new(),
//!     };
//!     Ok(StreamingResponse::with_text(text))
//! }));
//! let server = Server::builder().handler(router).start_pipe(&path).await?;
//!
//! // in the other process
//! let client = Client::builder().connect_pipe(&path).await?;
//! let mut request = StreamingRequest::post("/api/messages");
//! request.set_body_text("hello");
//! let response = client.send(request).await?;
//! ```

pub mod adapter;
pub mod backpressure;
pub mod codec;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod payloads;
pub mod protocol;
pub mod stream;
pub mod transport;

mod client;
mod server;

pub use client::{Client, ClientBuilder};
pub use connection::{Connection, ConnectionConfig};
pub use error::{Result, StreamingError};
pub use handler::{handler_fn, RequestHandler, RequestRouter};
pub use message::{
    ContentStream, HttpContent, ReceiveRequest, ReceiveResponse, StreamingRequest,
    StreamingResponse,
};
pub use protocol::{PayloadType, StreamId};
pub use server::{Server, ServerBuilder};
pub use tokio_util::sync::CancellationToken;
