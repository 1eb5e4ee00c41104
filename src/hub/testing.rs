// In-memory transport for hub tests.

use futures_util::{sink, stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::client::Transport;
use super::codec::RECORD_SEPARATOR;

/// The server's side of an in-memory transport.
pub struct RemoteEnd {
    incoming: mpsc::UnboundedReceiver<Message>,
    outgoing: Option<mpsc::UnboundedSender<Result<Message, WsError>>>,
}

impl RemoteEnd {
    /// Deliver a raw text frame to the client.
    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.outgoing {
            let _ = tx.send(Ok(Message::Text(text.to_string().into())));
        }
    }

    /// Deliver one terminated JSON record to the client.
    pub fn push_record(&self, record: Value) {
        self.push_raw(&format!("{record}{RECORD_SEPARATOR}"));
    }

    /// Next record the client wrote, parsed as JSON.
    pub async fn next_record(&mut self) -> Value {
        loop {
            match self.incoming.recv().await {
                Some(Message::Text(text)) => {
                    let body = text.as_str().trim_end_matches(RECORD_SEPARATOR);
                    return serde_json::from_str(body).expect("client wrote invalid JSON");
                }
                Some(_) => continue,
                None => panic!("client side dropped"),
            }
        }
    }

    /// End the client's read stream.
    pub fn close(&mut self) {
        self.outgoing = None;
    }
}

pub fn memory_transport() -> (Transport, RemoteEnd) {
    let (to_client, from_remote) = mpsc::unbounded_channel::<Result<Message, WsError>>();
    let (to_remote, from_client) = mpsc::unbounded_channel::<Message>();

    let read = stream::unfold(from_remote, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let write = sink::unfold(to_remote, |tx, msg: Message| async move {
        let _ = tx.send(msg);
        Ok::<_, WsError>(tx)
    });

    (
        Transport {
            read: Box::pin(read),
            write: Box::pin(write),
        },
        RemoteEnd {
            incoming: from_client,
            outgoing: Some(to_client),
        },
    )
}
