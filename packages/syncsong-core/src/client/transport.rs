//! WebSocket transport from a client to the session registry.
//!
//! [`connect`] bridges one WebSocket to a pair of typed channels so the
//! [`SyncClient`](super::SyncClient) never touches frames.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientMessage, ServerMessage};

const OUTGOING_CAPACITY: usize = 64;
const INCOMING_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Typed ends of an open connection.
pub struct Connection {
    /// Requests to the registry.
    pub outgoing: mpsc::Sender<ClientMessage>,
    /// Messages from the registry. Closes when the socket does.
    pub incoming: mpsc::Receiver<ServerMessage>,
    /// The socket pump. Ends when the socket closes or `outgoing` is dropped.
    pub task: JoinHandle<()>,
}

/// Opens a WebSocket to `url` (for example `ws://host:3000/ws`).
pub async fn connect(url: &str) -> Result<Connection, TransportError> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    log::info!("[Transport] Connected to {}", url);

    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientMessage>(OUTGOING_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel::<ServerMessage>(INCOMING_CAPACITY);

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                request = outgoing_rx.recv() => {
                    let Some(request) = request else {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if let Err(err) = sink.send(Message::text(request.encode())).await {
                        log::warn!("[Transport] Send failed: {}", err);
                        break;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::decode(text.as_str()) {
                        Ok(message) => {
                            if incoming_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => log::warn!("[Transport] Undecodable frame: {}", err),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        log::warn!("[Transport] Receive failed: {}", err);
                        break;
                    }
                    // Pongs to server pings are queued by tungstenite itself.
                    Some(Ok(_)) => {}
                },
            }
        }
        log::info!("[Transport] Connection closed");
    });

    Ok(Connection {
        outgoing: outgoing_tx,
        incoming: incoming_rx,
        task,
    })
}
