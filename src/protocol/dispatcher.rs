use crate::core::serialization::{Marshal, Serializer};
use crate::error::{ProtocolError, Result};
use crate::protocol::server_codec::{Reply, Request, ServerCodec};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outcome of one handler invocation: a value to marshal, or error text for
/// the response header.
pub type HandlerResult = std::result::Result<Box<dyn Marshal>, String>;

type HandlerFuture = BoxFuture<'static, HandlerResult>;
type HandlerFn = dyn Fn(Serializer, Vec<u8>) -> HandlerFuture + Send + Sync;

/// Method-name router for typed async handlers.
///
/// Handlers are stored type-erased: each takes the connection's serializer and
/// the decompressed request body, decodes its own argument type, and yields a
/// boxed [`Marshal`] result.
pub struct Dispatcher {
    handlers: RwLock<HashMap<Cow<'static, str>, Arc<HandlerFn>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` under `method`.
    ///
    /// # Errors
    /// `ProtocolError::DuplicateMethod` if the name is already taken.
    pub fn register<A, R, E, F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let erased = move |serializer: Serializer, payload: Vec<u8>| -> HandlerFuture {
            match serializer.unmarshal::<A>(&payload) {
                Ok(args) => {
                    let call = handler(args);
                    Box::pin(async move {
                        match call.await {
                            Ok(reply) => Ok(Box::new(reply) as Box<dyn Marshal>),
                            Err(e) => Err(e.to_string()),
                        }
                    })
                }
                Err(e) => Box::pin(async move { Err(e.to_string()) }),
            }
        };

        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::lock_poisoned())?;
        if handlers.contains_key(method) {
            return Err(ProtocolError::DuplicateMethod(method.to_string()));
        }
        handlers.insert(Cow::Owned(method.to_string()), Arc::new(erased));
        Ok(())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(method))
            .unwrap_or(false)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .map(|h| h.keys().map(|k| k.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn handler(&self, method: &str) -> Result<Option<Arc<HandlerFn>>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::lock_poisoned())?;
        Ok(handlers.get(method).cloned())
    }

    /// Run the request loop for one connection until the peer goes away or the
    /// stream breaks.
    ///
    /// Every invocation runs on its own task and answers through the shared
    /// codec, so responses may leave in any order. Once reading stops, the
    /// loop waits for in-flight invocations and then closes the codec.
    ///
    /// A clean close by the peer returns `Ok(())`; any other fatal fault is
    /// returned after the in-flight work has drained.
    pub async fn serve_codec(self: Arc<Self>, codec: Arc<ServerCodec>) -> Result<()> {
        let mut tasks = JoinSet::new();

        let outcome = loop {
            let request = match codec.read_request_header().await {
                Ok(request) => request,
                Err(e) => break e,
            };

            let handler = match self.handler(&request.method) {
                Ok(handler) => handler,
                Err(e) => break e,
            };

            let Some(handler) = handler else {
                if let Err(e) = codec.discard_request_body().await {
                    if e.is_fatal() {
                        break e;
                    }
                }
                debug!(seq = request.seq, method = %request.method, "unknown method");
                let unknown = ProtocolError::UnknownMethod(request.method);
                let reply = Reply::error(request.seq, unknown.to_string());
                if let Err(e) = codec.write_response(&reply, None).await {
                    break e;
                }
                continue;
            };

            let payload = match codec.read_request_payload().await {
                Ok(payload) => payload,
                Err(e) if e.is_fatal() => break e,
                Err(e) => {
                    warn!(
                        seq = request.seq,
                        method = %request.method,
                        error = %e,
                        "rejecting request body"
                    );
                    let reply = Reply::error(request.seq, e.to_string());
                    if let Err(e) = codec.write_response(&reply, None).await {
                        break e;
                    }
                    continue;
                }
            };

            let serializer = codec.serializer();
            let codec = Arc::clone(&codec);
            tasks.spawn(invoke(codec, request, handler(serializer, payload)));

            // Reap whatever has already finished so the set stays small.
            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        };

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        if let Err(e) = codec.close().await {
            debug!(error = %e, "closing server codec");
        }

        match outcome {
            ProtocolError::ConnectionClosed => Ok(()),
            e => Err(e),
        }
    }
}

async fn invoke(codec: Arc<ServerCodec>, request: Request, call: HandlerFuture) {
    let mut result = match call.await {
        Ok(value) => {
            codec
                .write_response(&Reply::ok(request.seq), Some(value.as_ref()))
                .await
        }
        Err(text) => {
            codec
                .write_response(&Reply::error(request.seq, text), None)
                .await
        }
    };

    // A reply that could not be encoded is still owed an answer. An oversized
    // reply is refused before any byte is written, so the stream is intact.
    if let Err(e) = &result {
        let unsent = matches!(e, ProtocolError::FrameTooLarge(_)) || !e.is_fatal();
        if unsent && !matches!(e, ProtocolError::InvalidSequence(_)) {
            let reply = Reply::error(request.seq, e.to_string());
            result = codec.write_response(&reply, None).await;
        }
    }

    if let Err(e) = result {
        warn!(
            seq = request.seq,
            method = %request.method,
            error = %e,
            "failed to write response"
        );
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "handler task failed");
    }
}
