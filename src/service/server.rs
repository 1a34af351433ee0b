use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::server_codec::ServerCodec;
use crate::utils::compression::CompressorRegistry;

/// How long a shutdown waits for open connections to finish
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// RPC server: a method registry plus the accept and dispatch loops
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<CompressorRegistry>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(CompressorRegistry::builtin()))
    }

    /// Server whose codecs use a custom compressor registry
    pub fn with_registry(config: ServerConfig, registry: Arc<CompressorRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(Dispatcher::new()),
            registry,
        }
    }

    /// Register an async handler under `method`.
    ///
    /// The handler's argument type is decoded from the request body with the
    /// configured serializer; an `Err` is sent back as the response's error
    /// text.
    ///
    /// # Errors
    /// `ProtocolError::DuplicateMethod` if `method` is already registered.
    pub fn register<A, R, E, F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.dispatcher.register(method, handler)?;
        debug!(method, "Registered handler");
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve a single connection until the peer closes it
    pub async fn serve_conn<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = Arc::new(ServerCodec::with_registry(
            stream,
            &self.config,
            Arc::clone(&self.registry),
        ));
        Arc::clone(&self.dispatcher).serve_codec(codec).await
    }

    /// Accept connections until CTRL+C
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.serve_with_shutdown(listener, shutdown_rx).await
    }

    /// Accept connections until a message arrives on `shutdown_rx` (or every
    /// sender is dropped), then wait for open connections to finish.
    ///
    /// # Errors
    /// `ProtocolError::ConfigError` if the server config fails validation.
    #[instrument(skip(self, listener, shutdown_rx))]
    pub async fn serve_with_shutdown(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        self.config.validate_strict()?;
        let max_connections = self.config.max_connections;
        let all_slots = u32::try_from(max_connections).map_err(|_| {
            ProtocolError::ConfigError(format!("Max connections too large: {max_connections}"))
        })?;
        let slots = Arc::new(Semaphore::new(max_connections));

        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Listening for RPC connections");
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    break;
                }

                accept_result = listener.accept() => {
                    let (stream, peer) = match accept_result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&slots).try_acquire_owned() else {
                        warn!(peer = %peer, max_connections, "Connection limit reached, rejecting");
                        continue;
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    info!(peer = %peer, "New connection established");
                    let server = self.clone();
                    tokio::spawn(async move {
                        match server.serve_conn(stream).await {
                            Ok(()) => info!(peer = %peer, "Connection closed"),
                            Err(e) => error!(peer = %peer, error = %e, "Connection failed"),
                        }
                        drop(permit);
                    });
                }
            }
        }

        let drained = tokio::time::timeout(
            SHUTDOWN_GRACE,
            slots.acquire_many(all_slots),
        )
        .await;
        match drained {
            Ok(_) => info!("All connections closed, shutting down"),
            Err(_) => warn!("Shutdown timeout reached, forcing exit"),
        }
        Ok(())
    }
}
