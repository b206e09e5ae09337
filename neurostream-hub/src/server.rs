//! WebSocket front door
//!
//! Accept loop plus one reader/writer task pair per connection. The reader
//! forwards text frames to the hub untouched; the writer drains the
//! per-client queue the hub broadcasts into. A closed transport just
//! deregisters the client, it is never an application error.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{HubError, Result};
use crate::hub::HubCommand;

/// Run the accept loop until the listener fails or the hub goes away.
pub async fn serve(listener: TcpListener, hub: mpsc::Sender<HubCommand>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "websocket server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        if hub.is_closed() {
            return Err(HubError::HubClosed);
        }
        debug!(%peer, "incoming connection");
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, hub).await {
                debug!(%peer, "connection ended: {e}");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, hub: mpsc::Sender<HubCommand>) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    // The hub broadcasts into this queue; a dedicated task drains it so one
    // slow client never stalls the hub.
    let (tx, mut rx) = unbounded_channel::<Message>();
    let (reply_tx, reply_rx) = oneshot::channel();
    hub.send(HubCommand::Register {
        sender: tx.clone(),
        reply: reply_tx,
    })
    .await
    .map_err(|_| HubError::HubClosed)?;
    let client = reply_rx.await.map_err(|_| HubError::HubClosed)?;

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if hub
                    .send(HubCommand::Control {
                        client,
                        raw: text.to_string(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            // Binary and pong frames are ignored.
            Ok(_) => {}
            Err(e) => {
                debug!(%client, "read error: {e}");
                break;
            }
        }
    }

    if hub
        .send(HubCommand::Deregister { client })
        .await
        .is_err()
    {
        warn!(%client, "hub gone before deregistration");
    }
    drop(tx);
    let _ = writer.await;
    Ok(())
}
