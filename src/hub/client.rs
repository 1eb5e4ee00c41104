// Connection supervisor: connects through a `Connector`, drives the
// connection, and walks the retry schedule whenever it drops.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::codec::FrameBuffer;
use super::connection::{self, ConnectionEnd, KeepAlive};
use super::negotiate;
use super::retry::RetryPolicy;
use super::{HubCommand, HubError, HubEvent, InvocationReply};
use crate::config::Config;

pub type TransportRead = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;
pub type TransportWrite = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// An open WebSocket, split into halves.
pub struct Transport {
    pub read: TransportRead,
    pub write: TransportWrite,
}

/// Opens WebSocket transports to the hub.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Transport, HubError>;
}

// ---------------------------------------------------------------------------
// TungsteniteConnector
// ---------------------------------------------------------------------------

/// Production connector: negotiate over HTTP (unless skipped), then open the
/// socket with tokio-tungstenite.
pub struct TungsteniteConnector {
    http: reqwest::Client,
    hub_url: String,
    access_token: Option<String>,
    skip_negotiation: bool,
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    /// `connect_timeout` bounds both the negotiate request and opening the
    /// socket.
    pub fn new(
        hub_url: String,
        access_token: Option<String>,
        skip_negotiation: bool,
        connect_timeout: Duration,
    ) -> Result<Self, HubError> {
        let http = reqwest::Client::builder().timeout(connect_timeout).build()?;
        Ok(Self {
            http,
            hub_url,
            access_token,
            skip_negotiation,
            connect_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, HubError> {
        Self::new(
            config.hub.url.clone(),
            config.credentials.access_token.clone(),
            config.hub.skip_negotiation,
            config.hub.handshake_timeout(),
        )
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self) -> Result<Transport, HubError> {
        let endpoint = if self.skip_negotiation {
            negotiate::direct_endpoint(&self.hub_url, self.access_token.as_deref())?
        } else {
            negotiate::negotiate(&self.http, &self.hub_url, self.access_token.as_deref()).await?
        };

        let mut request = endpoint.ws_url.as_str().into_client_request()?;
        if let Some(token) = &endpoint.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HubError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| HubError::ConnectTimeout(self.connect_timeout))??;
        let (write, read) = ws.split();
        Ok(Transport {
            read: Box::pin(read),
            write: Box::pin(write),
        })
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Timing knobs for `run_supervisor`.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub policy: RetryPolicy,
    pub keep_alive: KeepAlive,
    pub handshake_timeout: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        SupervisorSettings {
            policy: RetryPolicy::new(config.hub.reconnect_delays()),
            keep_alive: KeepAlive {
                interval: config.hub.keep_alive_interval(),
                server_timeout: config.hub.server_timeout(),
            },
            handshake_timeout: config.hub.handshake_timeout(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        SupervisorSettings {
            policy: RetryPolicy::default(),
            keep_alive: KeepAlive::default(),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

/// Run the hub connection until stopped.
///
/// Lifecycle events and server invocations go out on `events`. The first
/// successful connection emits `Connected`; every later one emits
/// `Reconnected` until the schedule is exhausted, at which point
/// `Disconnected` is emitted and the supervisor idles until a `Reconnect`
/// command starts over. The initial connection follows the same retry
/// schedule as reconnects.
pub async fn run_supervisor<C: Connector>(
    connector: C,
    settings: SupervisorSettings,
    mut cmd_rx: mpsc::Receiver<HubCommand>,
    events: mpsc::Sender<HubEvent>,
) {
    let mut next_invocation_id: u64 = 0;
    let mut has_connected = false;
    let mut attempt: u32 = 0;

    loop {
        let opening = open_or_stop(&connector, settings.handshake_timeout, &mut cmd_rx);
        let opened = match opening.await {
            Some(opened) => opened,
            None => {
                info!("Hub supervisor stopped while connecting");
                let _ = events.send(HubEvent::Disconnected { reason: None }).await;
                return;
            }
        };

        let failure = match opened {
            Ok((transport, buffer)) => {
                attempt = 0;
                let event = if has_connected {
                    info!("Reconnected to hub");
                    HubEvent::Reconnected
                } else {
                    info!("Connected to hub");
                    HubEvent::Connected
                };
                has_connected = true;
                if events.send(event).await.is_err() {
                    return;
                }

                let end = connection::drive(
                    transport,
                    buffer,
                    settings.keep_alive,
                    &mut cmd_rx,
                    &events,
                    &mut next_invocation_id,
                )
                .await;

                match end {
                    ConnectionEnd::Stopped => {
                        let _ = events.send(HubEvent::Disconnected { reason: None }).await;
                        return;
                    }
                    ConnectionEnd::Closed {
                        error,
                        allow_reconnect: false,
                    } => {
                        let reason = error.unwrap_or_else(|| "server closed the connection".into());
                        warn!("Hub closed the connection without reconnect: {reason}");
                        if events
                            .send(HubEvent::Disconnected {
                                reason: Some(reason),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        if !wait_for_restart(&mut cmd_rx).await {
                            return;
                        }
                        has_connected = false;
                        continue;
                    }
                    ConnectionEnd::Closed {
                        error,
                        allow_reconnect: true,
                    } => error.unwrap_or_else(|| "server closed the connection".into()),
                    ConnectionEnd::Lost(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        match settings.policy.next_delay(attempt) {
            Some(delay) => {
                attempt += 1;
                warn!("Hub connection unavailable ({failure}); retry {attempt} in {delay:?}");
                if events
                    .send(HubEvent::Reconnecting {
                        attempt,
                        delay,
                        reason: failure,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                if !idle(delay, &mut cmd_rx).await {
                    let _ = events.send(HubEvent::Disconnected { reason: None }).await;
                    return;
                }
            }
            None => {
                warn!("Giving up on hub connection after {attempt} retries: {failure}");
                if events
                    .send(HubEvent::Disconnected {
                        reason: Some(failure),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                if !wait_for_restart(&mut cmd_rx).await {
                    return;
                }
                attempt = 0;
                has_connected = false;
            }
        }
    }
}

async fn open<C: Connector>(
    connector: &C,
    handshake_timeout: Duration,
) -> Result<(Transport, FrameBuffer), HubError> {
    let mut transport = connector.connect().await?;
    let buffer = connection::handshake(&mut transport, handshake_timeout).await?;
    Ok((transport, buffer))
}

/// Connect while still serving commands. Invocations are refused until the
/// handshake completes. Returns `None` when the supervisor should stop.
async fn open_or_stop<C: Connector>(
    connector: &C,
    handshake_timeout: Duration,
    cmd_rx: &mut mpsc::Receiver<HubCommand>,
) -> Option<Result<(Transport, FrameBuffer), HubError>> {
    let opening = open(connector, handshake_timeout);
    tokio::pin!(opening);
    loop {
        tokio::select! {
            opened = &mut opening => return Some(opened),
            cmd = cmd_rx.recv() => match cmd {
                Some(HubCommand::Invoke { reply, .. }) => reject(reply),
                Some(HubCommand::Reconnect) => debug!("Reconnect requested while connecting, ignoring"),
                Some(HubCommand::Stop) | None => return None,
            },
        }
    }
}

fn reject(reply: Option<InvocationReply>) {
    if let Some(reply) = reply {
        let _ = reply.send(Err(HubError::NotConnected));
    }
}

/// Wait out a retry delay. Returns `false` if the supervisor should stop.
/// A `Reconnect` command cuts the wait short.
async fn idle(delay: Duration, cmd_rx: &mut mpsc::Receiver<HubCommand>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(HubCommand::Invoke { reply, .. }) => reject(reply),
                Some(HubCommand::Reconnect) => return true,
                Some(HubCommand::Stop) | None => return false,
            },
        }
    }
}

/// After giving up, wait for a manual `Reconnect`. Returns `false` if the
/// supervisor should stop.
async fn wait_for_restart(cmd_rx: &mut mpsc::Receiver<HubCommand>) -> bool {
    loop {
        match cmd_rx.recv().await {
            Some(HubCommand::Invoke { reply, .. }) => reject(reply),
            Some(HubCommand::Reconnect) => {
                info!("Manual reconnect requested");
                return true;
            }
            Some(HubCommand::Stop) | None => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
