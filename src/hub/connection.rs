// One hub connection: handshake, then the read/write loop until the
// connection ends.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::client::Transport;
use super::codec::{self, FrameBuffer, HubMessage};
use super::{HubCommand, HubError, HubEvent, InvocationReply};

/// Keep-alive timing for a connection.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    /// How often the client pings the server.
    pub interval: Duration,
    /// How long the client tolerates silence from the server.
    pub server_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        KeepAlive {
            interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
        }
    }
}

/// Why `drive` returned.
#[derive(Debug, PartialEq)]
pub enum ConnectionEnd {
    /// Stop was requested, or every `HubClient` handle and the event
    /// receiver are gone.
    Stopped,
    /// Transport failure, server silence, or an unannounced close.
    Lost(String),
    /// The server sent a Close message.
    Closed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

/// Perform the protocol handshake. Returns the buffer holding any records
/// that arrived after the handshake response.
pub async fn handshake(transport: &mut Transport, timeout: Duration) -> Result<FrameBuffer, HubError> {
    transport
        .write
        .send(Message::Text(codec::handshake_request().into()))
        .await?;

    let read_response = async {
        let mut buffer = FrameBuffer::new();
        loop {
            if let Some(record) = buffer.next_record() {
                return match codec::parse_handshake_response(&record)? {
                    None => Ok(buffer),
                    Some(error) => Err(HubError::HandshakeRejected(error)),
                };
            }
            match transport.read.next().await {
                Some(Ok(Message::Text(text))) => buffer.push(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return Err(HubError::HandshakeClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    };

    tokio::time::timeout(timeout, read_response)
        .await
        .map_err(|_| HubError::HandshakeTimeout(timeout))?
}

/// Drive an established connection until it ends.
///
/// Server invocations are forwarded to `events`; client commands arrive on
/// `cmd_rx`. Invocation ids come from `next_invocation_id`, which outlives a
/// single connection so ids stay unique across reconnects. Every invocation
/// still awaiting its completion when the connection ends fails with
/// `HubError::ConnectionLost`.
pub async fn drive(
    transport: Transport,
    mut buffer: FrameBuffer,
    keep_alive: KeepAlive,
    cmd_rx: &mut mpsc::Receiver<HubCommand>,
    events: &mpsc::Sender<HubEvent>,
    next_invocation_id: &mut u64,
) -> ConnectionEnd {
    let Transport { mut read, mut write } = transport;
    let mut pending: HashMap<String, (String, InvocationReply)> = HashMap::new();

    let end = 'conn: {
        // Records that rode along with the handshake response.
        if let Some(end) = dispatch(&mut buffer, &mut pending, events).await {
            break 'conn end;
        }

        let mut ping =
            tokio::time::interval_at(Instant::now() + keep_alive.interval, keep_alive.interval);
        let mut last_received = Instant::now();

        loop {
            let deadline = last_received + keep_alive.server_timeout;

            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_received = Instant::now();
                        buffer.push(text.as_str());
                        if let Some(end) = dispatch(&mut buffer, &mut pending, events).await {
                            break 'conn end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let detail = frame
                            .map(|f| format!(" ({} {})", f.code, f.reason))
                            .unwrap_or_default();
                        break 'conn ConnectionEnd::Lost(format!("server closed the socket{detail}"));
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames still prove the server is alive.
                        last_received = Instant::now();
                    }
                    Some(Err(e)) => break 'conn ConnectionEnd::Lost(e.to_string()),
                    None => break 'conn ConnectionEnd::Lost("socket closed".into()),
                },

                cmd = cmd_rx.recv() => match cmd {
                    Some(HubCommand::Invoke { target, arguments, reply }) => {
                        let invocation_id = reply.as_ref().map(|_| {
                            *next_invocation_id += 1;
                            next_invocation_id.to_string()
                        });
                        let msg = HubMessage::Invocation {
                            invocation_id: invocation_id.clone(),
                            target: target.clone(),
                            arguments,
                        };
                        let record = match codec::encode(&msg) {
                            Ok(record) => record,
                            Err(e) => {
                                warn!("Failed to encode invocation of {target}: {e}");
                                if let Some(reply) = reply {
                                    let _ = reply.send(Err(e.into()));
                                }
                                continue;
                            }
                        };
                        debug!("Invoking {target} (id: {invocation_id:?})");
                        if let Err(e) = write.send(Message::Text(record.into())).await {
                            if let Some(reply) = reply {
                                let _ = reply.send(Err(HubError::ConnectionLost));
                            }
                            break 'conn ConnectionEnd::Lost(e.to_string());
                        }
                        if let (Some(id), Some(reply)) = (invocation_id, reply) {
                            pending.insert(id, (target, reply));
                        }
                    }
                    Some(HubCommand::Reconnect) => {
                        debug!("Reconnect requested while connected, ignoring");
                    }
                    Some(HubCommand::Stop) | None => {
                        info!("Stopping hub connection");
                        let _ = write.send(Message::Close(None)).await;
                        break 'conn ConnectionEnd::Stopped;
                    }
                },

                _ = ping.tick() => {
                    let record = match codec::encode(&HubMessage::Ping) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!("Failed to encode ping: {e}");
                            continue;
                        }
                    };
                    trace!("Sending keep-alive ping");
                    if let Err(e) = write.send(Message::Text(record.into())).await {
                        break 'conn ConnectionEnd::Lost(e.to_string());
                    }
                }

                _ = tokio::time::sleep_until(deadline) => {
                    break 'conn ConnectionEnd::Lost(format!(
                        "no message from the server for {:?}",
                        keep_alive.server_timeout
                    ));
                }
            }
        }
    };

    for (_, (target, reply)) in pending.drain() {
        debug!("Failing pending invocation of {target}: connection ended");
        let _ = reply.send(Err(HubError::ConnectionLost));
    }

    end
}

/// Handle every complete record in `buffer`. Returns `Some` when the
/// connection must end.
async fn dispatch(
    buffer: &mut FrameBuffer,
    pending: &mut HashMap<String, (String, InvocationReply)>,
    events: &mpsc::Sender<HubEvent>,
) -> Option<ConnectionEnd> {
    for decoded in buffer.drain_messages() {
        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping undecodable hub record: {e}");
                continue;
            }
        };

        match msg {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                if let Some(id) = invocation_id {
                    warn!("Server expects a result for {target} (id {id}); client results are not supported");
                }
                if events
                    .send(HubEvent::Invocation { target, arguments })
                    .await
                    .is_err()
                {
                    return Some(ConnectionEnd::Stopped);
                }
            }
            HubMessage::Completion {
                invocation_id,
                outcome,
            } => match pending.remove(&invocation_id) {
                Some((target, reply)) => {
                    let result = outcome.map_err(|message| HubError::Invocation { target, message });
                    let _ = reply.send(result);
                }
                None => debug!("Completion for unknown invocation {invocation_id}"),
            },
            HubMessage::Ping => trace!("Ping from server"),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                info!("Server sent close (error: {error:?}, allow_reconnect: {allow_reconnect})");
                return Some(ConnectionEnd::Closed {
                    error,
                    allow_reconnect,
                });
            }
            other => debug!("Ignoring hub message {other:?}"),
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
