//! # Endpoint
//!
//! A network node that both listens for frames and sends them.
//!
//! ## Tasks
//!
//! ```text
//!                 enqueue/send                      recv/try_recv
//!   application ──────────────► [outbound queue]    [inbound queue] ──────────► application
//!                                      │                   ▲
//!                                      ▼                   │ RecvPackage
//!                                sender loop        connection handlers (one per peer)
//!                               (one at a time)            ▲
//!                                      │                   │ accept
//!                                      ▼                   │
//!                              connect/write/close     accept loop
//! ```
//!
//! The two queues are unbounded tokio channels and are the only state shared
//! between tasks. Closing the outbound channel is what stops the sender loop;
//! the accept loop stops on a oneshot signal.
//!
//! ## Lifecycle
//!
//! `Created -> Running -> Closing -> Closed`, never backwards.

use log::{debug, error, info, warn};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use super::connection::Connection;
use super::package::{RecvPackage, SendPackage};
use crate::common::config::EndpointConfig;
use crate::protocol::{Codec, DataBlock, Message, ValidationError};

/// Where an endpoint is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Created,
    Running,
    Closing,
    Closed,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::Created => "created",
            EndpointState::Running => "running",
            EndpointState::Closing => "closing",
            EndpointState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What [`Endpoint::close`] does with connections still being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseMode {
    /// Wait for in-flight connection handlers to finish and queue their frames.
    Drain,
    /// Abort in-flight connection handlers; partial frames are lost.
    #[default]
    Abort,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("endpoint is {actual}, expected {expected}")]
    InvalidState {
        expected: EndpointState,
        actual: EndpointState,
    },

    #[error("endpoint is closed")]
    Closed,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Settings every connection handler needs, shared by reference count.
struct HandlerContext {
    codec: Codec,
    buffer_size: usize,
    log_target: Arc<str>,
}

/// Bidirectional frame endpoint.
///
/// # Example
/// ```ignore
/// let mut endpoint = Endpoint::new(EndpointConfig::default());
/// endpoint.run().await?;
///
/// endpoint.send("localhost", 13579, &message, &blocks)?;
/// if let Some(package) = endpoint.recv().await {
///     println!("{}", package);
/// }
///
/// let leftovers = endpoint.close(CloseMode::Drain).await?;
/// ```
pub struct Endpoint {
    config: EndpointConfig,
    codec: Codec,
    /// Target for every log line this endpoint writes
    log_target: Arc<str>,
    state: EndpointState,
    local_addr: Option<SocketAddr>,

    /// Outbound queue; dropped on close so the sender loop sees the end
    send_tx: Option<mpsc::UnboundedSender<SendPackage>>,
    /// Held until `run` hands it to the sender loop
    send_rx: Option<mpsc::UnboundedReceiver<SendPackage>>,

    /// Held until `run` hands it to the accept loop
    recv_tx: Option<mpsc::UnboundedSender<RecvPackage>>,
    recv_rx: mpsc::UnboundedReceiver<RecvPackage>,

    sender_task: Option<JoinHandle<()>>,
    accept_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<CloseMode>>,
}

impl Endpoint {
    /// Create an endpoint in the `Created` state. Nothing is bound yet.
    ///
    /// Packages enqueued before [`run`](Self::run) wait in the outbound queue.
    pub fn new(config: EndpointConfig) -> Self {
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (recv_tx, recv_rx) = mpsc::unbounded_channel();

        Self {
            codec: config.codec(),
            log_target: Arc::from(config.log_target.as_str()),
            config,
            state: EndpointState::Created,
            local_addr: None,
            send_tx: Some(send_tx),
            send_rx: Some(send_rx),
            recv_tx: Some(recv_tx),
            recv_rx,
            sender_task: None,
            accept_task: None,
            shutdown_tx: None,
        }
    }

    /// Create an endpoint and run it straight away.
    pub async fn start(config: EndpointConfig) -> Result<Self, EndpointError> {
        let mut endpoint = Self::new(config);
        endpoint.run().await?;
        Ok(endpoint)
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Address the listener is bound to, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and start the accept loop and the sender loop.
    ///
    /// # Errors
    /// - [`EndpointError::InvalidState`] unless the endpoint is `Created`
    /// - [`EndpointError::Bind`] if the listener can't be bound; the endpoint stays `Created`
    pub async fn run(&mut self) -> Result<(), EndpointError> {
        if self.state != EndpointState::Created {
            return Err(EndpointError::InvalidState {
                expected: EndpointState::Created,
                actual: self.state,
            });
        }

        let address = self.config.bind_address();
        debug!(target: self.log_target.as_ref(), "Creating listening server on {}", address);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| EndpointError::Bind {
                address: address.clone(),
                source,
            })?;
        self.local_addr = listener.local_addr().ok();

        let (send_rx, recv_tx) = match (self.send_rx.take(), self.recv_tx.take()) {
            (Some(send_rx), Some(recv_tx)) => (send_rx, recv_tx),
            _ => {
                return Err(EndpointError::InvalidState {
                    expected: EndpointState::Created,
                    actual: self.state,
                })
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let context = Arc::new(HandlerContext {
            codec: self.codec,
            buffer_size: self.config.buffer_size,
            log_target: self.log_target.clone(),
        });

        debug!(target: self.log_target.as_ref(), "Starting the recv server...");
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            recv_tx,
            context,
            shutdown_rx,
        )));
        debug!(target: self.log_target.as_ref(), "Starting the send server...");
        self.sender_task = Some(tokio::spawn(send_loop(send_rx, self.log_target.clone())));
        self.shutdown_tx = Some(shutdown_tx);
        self.state = EndpointState::Running;

        info!(
            target: self.log_target.as_ref(),
            "Endpoint listening on {}",
            self.local_addr.map_or(address, |a| a.to_string())
        );
        Ok(())
    }

    /// Put an already-encoded package on the outbound queue.
    ///
    /// Fire-and-forget: delivery failures are logged by the sender loop and
    /// never reported back here.
    pub fn enqueue(&self, package: SendPackage) -> Result<(), EndpointError> {
        match &self.send_tx {
            Some(tx) => tx.send(package).map_err(|_| EndpointError::Closed),
            None => Err(EndpointError::Closed),
        }
    }

    /// Encode `message` and `blocks` with this endpoint's codec and enqueue them.
    ///
    /// # Errors
    /// - [`EndpointError::Validation`] if the message can't be encoded
    /// - [`EndpointError::Closed`] once the endpoint is closing or closed
    pub fn send(
        &self,
        address: impl Into<String>,
        port: u16,
        message: &Message,
        blocks: &[DataBlock],
    ) -> Result<(), EndpointError> {
        if self.send_tx.is_none() {
            return Err(EndpointError::Closed);
        }
        let payload = self.codec.encode(message, blocks)?;
        self.enqueue(SendPackage::new(address, port, payload))
    }

    /// Wait for the next received package.
    ///
    /// Returns `None` right away on an endpoint that was never run, and once
    /// a closed endpoint's inbound queue is empty.
    pub async fn recv(&mut self) -> Option<RecvPackage> {
        if self.state == EndpointState::Created {
            return None;
        }
        self.recv_rx.recv().await
    }

    /// Take a received package if one is waiting.
    pub fn try_recv(&mut self) -> Option<RecvPackage> {
        self.recv_rx.try_recv().ok()
    }

    /// Shut the endpoint down.
    ///
    /// 1. Closes the outbound queue; the sender loop sends everything already
    ///    queued, in order, then exits.
    /// 2. Waits for the sender loop to finish.
    /// 3. Stops the accept loop and closes the listening socket, draining or
    ///    aborting in-flight connection handlers per `mode`.
    ///
    /// Returns the packages still waiting in the inbound queue. Closing a
    /// `Closed` endpoint does nothing.
    pub async fn close(&mut self, mode: CloseMode) -> Result<Vec<RecvPackage>, EndpointError> {
        match self.state {
            EndpointState::Closed => return Ok(Vec::new()),
            EndpointState::Created => {
                debug!(target: self.log_target.as_ref(), "Closing an endpoint that never ran");
            }
            EndpointState::Running | EndpointState::Closing => {
                info!(target: self.log_target.as_ref(), "Closing endpoint ({:?})", mode);
            }
        }
        self.state = EndpointState::Closing;

        self.send_tx.take();
        self.send_rx.take();
        self.recv_tx.take();

        if let Some(task) = self.sender_task.take() {
            if let Err(e) = task.await {
                error!(target: self.log_target.as_ref(), "Sender loop failed: {}", e);
            }
        }

        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(mode);
        }
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!(target: self.log_target.as_ref(), "Accept loop failed: {}", e);
            }
        }

        self.state = EndpointState::Closed;

        let mut remaining = Vec::new();
        while let Ok(package) = self.recv_rx.try_recv() {
            remaining.push(package);
        }
        debug!(
            target: self.log_target.as_ref(),
            "Endpoint closed with {} unread packages",
            remaining.len()
        );
        Ok(remaining)
    }
}

/// Send queued packages one at a time until the outbound queue is closed.
async fn send_loop(mut queue: mpsc::UnboundedReceiver<SendPackage>, log_target: Arc<str>) {
    while let Some(package) = queue.recv().await {
        debug!(
            target: log_target.as_ref(),
            "Attempting to send to ({}, {})",
            package.address, package.port
        );

        match deliver(&package).await {
            Ok(()) => debug!(
                target: log_target.as_ref(),
                "Package of {} bytes sent to ({}, {})",
                package.payload.len(),
                package.address,
                package.port
            ),
            Err(e) => error!(
                target: log_target.as_ref(),
                "Error sending package to ({}, {}): {}",
                package.address, package.port, e
            ),
        }
    }

    debug!(target: log_target.as_ref(), "Send queue closed, sender loop exiting");
}

/// Open a fresh connection for one package, write it, and close.
async fn deliver(package: &SendPackage) -> io::Result<()> {
    let mut conn = Connection::connect(&package.address, package.port).await?;
    conn.write_frame(&package.payload).await
}

/// Accept connections until told to stop, spawning one handler per connection.
async fn accept_loop(
    listener: TcpListener,
    recv_tx: mpsc::UnboundedSender<RecvPackage>,
    context: Arc<HandlerContext>,
    mut shutdown: oneshot::Receiver<CloseMode>,
) {
    let mut handlers = JoinSet::new();

    let mode = loop {
        tokio::select! {
            // A dropped endpoint counts as an abort.
            mode = &mut shutdown => break mode.unwrap_or_default(),

            accepted = listener.accept() => match accepted {
                Ok((socket, address)) => {
                    debug!(target: context.log_target.as_ref(), "Received connection from {}", address);
                    handlers.spawn(handle_connection(
                        socket,
                        address,
                        recv_tx.clone(),
                        context.clone(),
                    ));
                }
                Err(e) => error!(target: context.log_target.as_ref(), "Accept error: {}", e),
            },

            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = finished {
                    error!(target: context.log_target.as_ref(), "Connection handler failed: {}", e);
                }
            }
        }
    };

    drop(listener);
    debug!(target: context.log_target.as_ref(), "Listening socket closed");

    match mode {
        CloseMode::Drain => {
            while let Some(finished) = handlers.join_next().await {
                if let Err(e) = finished {
                    error!(target: context.log_target.as_ref(), "Connection handler failed: {}", e);
                }
            }
        }
        CloseMode::Abort => {
            if !handlers.is_empty() {
                warn!(
                    target: context.log_target.as_ref(),
                    "Aborting {} in-flight connections",
                    handlers.len()
                );
            }
            handlers.shutdown().await;
        }
    }
}

/// Read one frame to end-of-stream, decode it, and queue it.
///
/// Errors stop here: they are logged and never reach the accept loop.
async fn handle_connection(
    socket: TcpStream,
    address: SocketAddr,
    recv_tx: mpsc::UnboundedSender<RecvPackage>,
    context: Arc<HandlerContext>,
) {
    let mut conn = Connection::new(socket);

    let frame = match conn.read_frame(context.buffer_size).await {
        Ok(frame) => frame,
        Err(e) => {
            error!(target: context.log_target.as_ref(), "Error reading from {}: {}", address, e);
            return;
        }
    };

    let (message, blocks) = match context.codec.decode(&frame) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(
                target: context.log_target.as_ref(),
                "Dropping malformed frame from {} ({} bytes): {}",
                address,
                frame.len(),
                e
            );
            return;
        }
    };

    debug!(
        target: context.log_target.as_ref(),
        "Received frame from {} with {} blocks",
        address,
        blocks.len()
    );

    let package = RecvPackage {
        address,
        message,
        blocks,
    };
    if recv_tx.send(package).is_err() {
        warn!(
            target: context.log_target.as_ref(),
            "Inbound queue closed, dropping frame from {}",
            address
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> EndpointConfig {
        EndpointConfig {
            address: "127.0.0.1".to_string(),
            port: 0,
            ..EndpointConfig::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let mut endpoint = Endpoint::new(local_config());
        assert_eq!(endpoint.state(), EndpointState::Created);
        assert!(endpoint.local_addr().is_none());
        assert_eq!(endpoint.config().address, "127.0.0.1");

        endpoint.run().await.unwrap();
        assert_eq!(endpoint.state(), EndpointState::Running);
        assert_ne!(endpoint.local_addr().unwrap().port(), 0);

        let remaining = endpoint.close(CloseMode::Abort).await.unwrap();
        assert!(remaining.is_empty());
        assert_eq!(endpoint.state(), EndpointState::Closed);

        // A second close is a no-op.
        assert!(endpoint.close(CloseMode::Drain).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let mut endpoint = Endpoint::start(local_config()).await.unwrap();
        let err = endpoint.run().await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::InvalidState {
                expected: EndpointState::Created,
                actual: EndpointState::Running,
            }
        ));
        endpoint.close(CloseMode::Abort).await.unwrap();

        let err = endpoint.run().await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::InvalidState {
                actual: EndpointState::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_aborts_run() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = EndpointConfig {
            port: occupied.local_addr().unwrap().port(),
            ..local_config()
        };

        let mut endpoint = Endpoint::new(config);
        let err = endpoint.run().await.unwrap_err();
        assert!(matches!(err, EndpointError::Bind { .. }));
        assert_eq!(endpoint.state(), EndpointState::Created);
    }

    #[tokio::test]
    async fn test_recv_before_run_returns_none() {
        let mut endpoint = Endpoint::new(local_config());
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), endpoint.recv())
            .await
            .unwrap();
        assert!(received.is_none());
        assert_eq!(endpoint.state(), EndpointState::Created);
    }

    #[tokio::test]
    async fn test_close_never_run_endpoint() {
        let mut endpoint = Endpoint::new(local_config());
        endpoint
            .enqueue(SendPackage::new("127.0.0.1", 1, vec![0, 0, 0, 2, b'{', b'}']))
            .unwrap();

        endpoint.close(CloseMode::Drain).await.unwrap();
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(endpoint.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let mut endpoint = Endpoint::start(local_config()).await.unwrap();
        endpoint.close(CloseMode::Abort).await.unwrap();

        let err = endpoint
            .send("127.0.0.1", 1, &Message::new(), &[])
            .unwrap_err();
        assert!(matches!(err, EndpointError::Closed));

        let err = endpoint
            .enqueue(SendPackage::new("127.0.0.1", 1, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EndpointError::Closed));
    }

    #[tokio::test]
    async fn test_send_surfaces_validation_error() {
        let endpoint = Endpoint::new(local_config());
        let mut message = Message::new();
        message.insert("data_blocks".into(), serde_json::json!([]));

        let err = endpoint.send("127.0.0.1", 1, &message, &[]).unwrap_err();
        assert!(matches!(
            err,
            EndpointError::Validation(ValidationError::ReservedKey(_))
        ));
    }
}
