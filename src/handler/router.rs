//! Routing of inbound requests by path and verb.
//!
//! Paths match exactly; verbs match case-insensitively. An unknown path
//! answers 404, a known path with an unregistered verb answers 405.

use std::collections::HashMap;

use tracing::debug;

use super::{BoxFuture, HandlerResult, RequestHandler};
use crate::message::{ReceiveRequest, StreamingResponse};

/// Registry mapping `(verb, path)` to handlers.
#[derive(Default)]
pub struct RequestRouter {
    /// Handlers by path, then by upper-case verb.
    routes: HashMap<String, HashMap<String, Box<dyn RequestHandler>>>,
}

impl RequestRouter {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same route.
    pub fn register<H: RequestHandler>(&mut self, verb: &str, path: &str, handler: H) -> &mut Self {
        self.routes
            .entry(path.to_string())
            .or_default()
            .insert(verb.to_ascii_uppercase(), Box::new(handler));
        self
    }

    /// Get the handler for a route.
    pub fn get_handler(&self, verb: &str, path: &str) -> Option<&dyn RequestHandler> {
        self.routes
            .get(path)
            .and_then(|verbs| verbs.get(&verb.to_ascii_uppercase()))
            .map(|h| h.as_ref())
    }

    /// Check if any verb is registered for `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }
}

impl RequestHandler for RequestRouter {
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, HandlerResult> {
        if let Some(handler) = self.get_handler(&request.verb, &request.path) {
            return handler.process_request(request);
        }

        let response = if self.has_path(&request.path) {
            debug!(verb = %request.verb, path = %request.path, "verb not allowed");
            StreamingResponse::method_not_allowed()
        } else {
            debug!(verb = %request.verb, path = %request.path, "no route");
            StreamingResponse::not_found()
        };
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::protocol::StreamId;

    fn request(verb: &str, path: &str) -> ReceiveRequest {
        ReceiveRequest {
            id: StreamId::new(),
            verb: verb.to_string(),
            path: path.to_string(),
            streams: Vec::new(),
        }
    }

    fn router() -> RequestRouter {
        let mut router = RequestRouter::new();
        router
            .register("GET", "/status", handler_fn(|_| async { Ok(StreamingResponse::ok()) }))
            .register(
                "post",
                "/api/messages",
                handler_fn(|r: ReceiveRequest| async move {
                    Ok(StreamingResponse::with_text(r.path))
                }),
            );
        router
    }

    #[test]
    fn test_register_and_lookup() {
        let router = router();

        assert!(router.get_handler("GET", "/status").is_some());
        assert!(router.get_handler("POST", "/api/messages").is_some());
        assert!(router.get_handler("get", "/status").is_some());
        assert!(router.get_handler("DELETE", "/status").is_none());
        assert!(!router.has_path("/missing"));
    }

    #[tokio::test]
    async fn test_dispatch_to_handler() {
        let response = router()
            .process_request(request("POST", "/api/messages"))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(&response.streams[0].body[..], b"/api/messages");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = router()
            .process_request(request("GET", "/missing"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 404);
    }

    #[tokio::test]
    async fn test_wrong_verb_is_405() {
        let response = router()
            .process_request(request("PUT", "/status"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 405);
    }
}
