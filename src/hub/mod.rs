// Real-time hub client: codec, negotiation, connection driver, and the
// reconnecting supervisor.
//
// The rest of the application talks to the hub through a cloneable
// `HubClient` handle and receives `HubEvent`s over an mpsc channel.

pub mod client;
pub mod codec;
pub mod connection;
pub mod negotiate;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use client::{run_supervisor, Connector, Transport, TungsteniteConnector};
pub use retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("negotiation failed: {0}")]
    Negotiate(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Codec(#[from] codec::CodecError),

    #[error("access token cannot be sent as a header")]
    InvalidToken,

    #[error("connecting to the hub timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("handshake rejected by server: {0}")]
    HandshakeRejected(String),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("connection closed during handshake")]
    HandshakeClosed,

    #[error("hub method `{target}` failed: {message}")]
    Invocation { target: String, message: String },

    #[error("hub method `{target}` timed out after {timeout:?}")]
    InvocationTimeout { target: String, timeout: Duration },

    #[error("not connected to the hub")]
    NotConnected,

    #[error("connection to the hub was lost")]
    ConnectionLost,

    #[error("hub client has shut down")]
    Shutdown,
}

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// Connection lifecycle and server pushes, emitted by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// The first connection of this supervisor (or of a manual restart after
    /// giving up) completed its handshake.
    Connected,
    /// The connection dropped; attempt `attempt` will start after `delay`.
    Reconnecting {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// A connection was re-established after a loss.
    Reconnected,
    /// Gave up (retry schedule exhausted, server refused reconnects, or the
    /// client was stopped).
    Disconnected { reason: Option<String> },
    /// The server invoked a client method.
    Invocation { target: String, arguments: Vec<Value> },
}

pub type InvocationReply = oneshot::Sender<Result<Value, HubError>>;

/// Requests from `HubClient` handles to the supervisor.
#[derive(Debug)]
pub enum HubCommand {
    /// Invoke a hub method. With `reply`, the call carries an invocation id
    /// and the completion is delivered through it.
    Invoke {
        target: String,
        arguments: Vec<Value>,
        reply: Option<InvocationReply>,
    },
    /// Restart the retry schedule after the client gave up.
    Reconnect,
    Stop,
}

/// Cloneable handle to a running supervisor.
#[derive(Debug, Clone)]
pub struct HubClient {
    cmd_tx: mpsc::Sender<HubCommand>,
    invocation_timeout: Duration,
}

impl HubClient {
    pub fn new(cmd_tx: mpsc::Sender<HubCommand>, invocation_timeout: Duration) -> Self {
        Self {
            cmd_tx,
            invocation_timeout,
        }
    }

    /// Invoke `target` and wait for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, HubError> {
        self.submit(target, arguments).await?.outcome().await
    }

    /// Queue an invocation and return a handle to its completion. Calls are
    /// written to the hub in the order they were submitted, so the caller can
    /// await the outcome elsewhere without losing ordering.
    pub async fn submit(
        &self,
        target: &str,
        arguments: Vec<Value>,
    ) -> Result<PendingInvocation, HubError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Invoke {
                target: target.to_string(),
                arguments,
                reply: Some(tx),
            })
            .await
            .map_err(|_| HubError::Shutdown)?;
        Ok(PendingInvocation {
            target: target.to_string(),
            reply: rx,
            timeout: self.invocation_timeout,
        })
    }

    /// Invoke `target` without waiting for a result.
    pub async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), HubError> {
        self.cmd_tx
            .send(HubCommand::Invoke {
                target: target.to_string(),
                arguments,
                reply: None,
            })
            .await
            .map_err(|_| HubError::Shutdown)
    }

    pub async fn reconnect(&self) -> Result<(), HubError> {
        self.cmd_tx
            .send(HubCommand::Reconnect)
            .await
            .map_err(|_| HubError::Shutdown)
    }

    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(HubCommand::Stop).await;
    }
}

/// A submitted invocation awaiting its completion.
#[derive(Debug)]
pub struct PendingInvocation {
    target: String,
    reply: oneshot::Receiver<Result<Value, HubError>>,
    timeout: Duration,
}

impl PendingInvocation {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn outcome(self) -> Result<Value, HubError> {
        match tokio::time::timeout(self.timeout, self.reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Shutdown),
            Err(_) => Err(HubError::InvocationTimeout {
                target: self.target,
                timeout: self.timeout,
            }),
        }
    }
}
