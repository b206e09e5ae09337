//! Client registry
//!
//! Lives inside the hub actor task, so no locking: each connected client is
//! an unbounded sender feeding that client's writer task. A send failure
//! means the writer is gone and the client is evicted on the spot.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::events::BroadcastEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

pub struct ClientRegistry {
    clients: HashMap<ClientId, UnboundedSender<Message>>,
    next_id: u64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, sender: UnboundedSender<Message>) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.insert(id, sender);
        info!(%id, total = self.clients.len(), "client connected");
        id
    }

    pub fn deregister(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            info!(%id, total = self.clients.len(), "client disconnected");
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send to one client only. Replies (`info`, targeted `error`) go here
    /// instead of the broadcast path.
    pub fn send_to(&mut self, id: ClientId, event: &BroadcastEvent) {
        let Some(json) = serialize(event) else {
            return;
        };
        let dead = match self.clients.get(&id) {
            Some(sender) => sender.send(Message::Text(json.into())).is_err(),
            None => false,
        };
        if dead {
            warn!(%id, "dropping client with closed writer");
            self.clients.remove(&id);
        }
    }

    /// Send to every client, evicting the ones whose writer has gone away.
    pub fn broadcast(&mut self, event: &BroadcastEvent) {
        let Some(json) = serialize(event) else {
            return;
        };
        let mut dead = Vec::new();
        for (id, sender) in &self.clients {
            if sender.send(Message::Text(json.clone().into())).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            warn!(%id, "dropping client with closed writer");
            self.clients.remove(&id);
        }
    }
}

fn serialize(event: &BroadcastEvent) -> Option<String> {
    match event.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            error!("failed to serialize event: {e}");
            None
        }
    }
}
