//! Handler module - inbound request handling.
//!
//! Provides:
//! - [`RequestHandler`] - produces the response to one inbound request
//! - [`handler_fn`] - adapts an async closure into a handler
//! - [`RequestRouter`] - dispatches by verb and path
//!
//! # Example
//!
//! ```ignore
//! use streamwire::handler::{handler_fn, RequestRouter};
//! use streamwire::StreamingResponse;
//!
//! let mut router = RequestRouter::new();
//!
//! router.register("POST", "/api/messages", handler_fn(|request| async move {
//!     let text = match request.body() {
//!         Some(body) => body.read_as_string().await?,
//!         None => String::new(),
//!     };
//!     Ok(StreamingResponse::with_text(text))
//! }));
//! ```

mod router;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::message::{ReceiveRequest, StreamingResponse};

pub use router::RequestRouter;

/// Result type for handler functions.
pub type HandlerResult = Result<StreamingResponse>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the response to inbound requests.
///
/// An `Err` or a panic becomes a 500 response for that request alone.
pub trait RequestHandler: Send + Sync + 'static {
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, HandlerResult>;
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(request))
    }
}

/// Turn an async closure into a [`RequestHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}
