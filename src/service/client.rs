use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::client_codec::ClientCodec;
use crate::utils::compression::CompressorRegistry;

type Waiter = oneshot::Sender<Result<Vec<u8>>>;

/// Calls that have been written and are waiting for their response
#[derive(Default)]
struct CallTable {
    seq: u64,
    calls: HashMap<u64, Waiter>,
    closed: bool,
}

struct Inner {
    codec: ClientCodec,
    calls: Mutex<CallTable>,
    request_timeout: Duration,
}

/// RPC client over a single connection.
///
/// Calls may be issued concurrently from any number of tasks (share the client
/// behind an `Arc`). A background task reads responses and routes each body to
/// the call waiting for it, so responses may arrive in any order.
///
/// Must be created inside a Tokio runtime.
pub struct Client {
    inner: Arc<Inner>,
    reader: JoinHandle<()>,
}

impl Client {
    /// Connect over TCP, bounded by `config.connection_timeout`
    #[instrument(skip(config))]
    pub async fn connect(addr: &str, config: ClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.connection_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        stream.set_nodelay(true)?;
        info!(peer = %addr, "Connected to RPC server");
        Ok(Self::new(stream, config))
    }

    /// Run the protocol over an already established stream
    pub fn new<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_registry(stream, config, Arc::new(CompressorRegistry::builtin()))
    }

    /// Run the protocol over `stream` with a custom compressor registry
    pub fn with_registry<S>(
        stream: S,
        config: ClientConfig,
        registry: Arc<CompressorRegistry>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let inner = Arc::new(Inner {
            codec: ClientCodec::with_registry(stream, &config, registry),
            calls: Mutex::new(CallTable::default()),
            request_timeout: config.request_timeout,
        });
        let reader = tokio::spawn(read_loop(Arc::clone(&inner)));
        Self { inner, reader }
    }

    /// Invoke `method` with `args` and wait for the reply.
    ///
    /// # Errors
    /// - `ProtocolError::Remote` carrying the server's error text
    /// - `ProtocolError::Timeout` if no reply arrives within `request_timeout`
    /// - `ProtocolError::ConnectionClosed` once the connection has failed or
    ///   been closed
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let payload = self.inner.call(method, args).await?;
        self.inner.codec.serializer().unmarshal(&payload)
    }

    /// Start a call in the background; the handle resolves when the reply
    /// (or failure) arrives.
    pub fn async_call<A, R>(&self, method: impl Into<String>, args: A) -> JoinHandle<Result<R>>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let method = method.into();
        tokio::spawn(async move {
            let payload = inner.call(&method, &args).await?;
            inner.codec.serializer().unmarshal(&payload)
        })
    }

    /// Number of calls still waiting for a reply
    pub fn in_flight(&self) -> usize {
        self.inner.calls.lock().map(|t| t.calls.len()).unwrap_or(0)
    }

    /// Whether the connection has been closed or has failed
    pub fn is_closed(&self) -> bool {
        self.inner.calls.lock().map(|t| t.closed).unwrap_or(true)
    }

    /// Stop accepting calls and shut down the write half.
    ///
    /// Replies to calls already in flight are still delivered until the
    /// server closes its side.
    pub async fn close(&self) -> Result<()> {
        if let Ok(mut table) = self.inner.calls.lock() {
            table.closed = true;
        }
        self.inner.codec.close().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Inner {
    async fn call<A>(&self, method: &str, args: &A) -> Result<Vec<u8>>
    where
        A: Serialize + Sync + ?Sized,
    {
        let (tx, rx) = oneshot::channel();
        let seq = {
            let mut table = self
                .calls
                .lock()
                .map_err(|_| ProtocolError::lock_poisoned())?;
            if table.closed {
                return Err(ProtocolError::ConnectionClosed);
            }
            let seq = table.seq;
            table.seq = table.seq.wrapping_add(1);
            table.calls.insert(seq, tx);
            seq
        };

        if let Err(e) = self.codec.write_request(seq, method, args).await {
            self.take(seq);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => {
                self.take(seq);
                self.codec.forget(seq);
                debug!(seq, method, "call timed out");
                Err(ProtocolError::Timeout)
            }
        }
    }

    fn take(&self, seq: u64) -> Option<Waiter> {
        self.calls.lock().ok().and_then(|mut t| t.calls.remove(&seq))
    }

    /// Fail every outstanding call and refuse new ones
    fn shut_down(&self) {
        if let Ok(mut table) = self.calls.lock() {
            table.closed = true;
            // Dropping the senders wakes each caller with ConnectionClosed.
            table.calls.clear();
        }
    }
}

async fn read_loop(inner: Arc<Inner>) {
    loop {
        let response = match inner.codec.read_response_header().await {
            Ok(response) => response,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read response header");
                break;
            }
        };

        let result = if response.is_error() {
            inner
                .codec
                .discard_response_body()
                .await
                .and(Err(ProtocolError::Remote(response.error)))
        } else {
            inner.codec.read_response_payload().await
        };

        let fatal = match &result {
            Err(e) if e.is_fatal() => {
                warn!(seq = response.seq, error = %e, "Failed to read response body");
                true
            }
            _ => false,
        };

        match inner.take(response.seq) {
            Some(waiter) => {
                // The caller may have given up already.
                let _ = waiter.send(result);
            }
            None => debug!(seq = response.seq, "Dropping reply nobody is waiting for"),
        }

        if fatal {
            break;
        }
    }

    inner.shut_down();
}
