//! Session state owned by the hub actor
//!
//! `SessionState` is never shared; only the hub task mutates it. Everyone
//! else sees a read-only `StateSnapshot` through a `watch` channel, so the
//! acquisition loop can stamp each sample with the mode that was in effect
//! when the window was captured.

use serde_json::{Map, Value};
use tokio::sync::watch;

pub const DEFAULT_MODE: &str = "background";
pub const DEFAULT_USER: &str = "default";

#[derive(Debug, Clone)]
pub struct SessionState {
    pub mode: String,
    pub context: Map<String, Value>,
    pub user_id: String,
    pub recording: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE.to_string(),
            context: Map::new(),
            user_id: DEFAULT_USER.to_string(),
            recording: false,
        }
    }
}

/// Read-only view handed to the acquisition loop.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub mode: String,
    pub context: Map<String, Value>,
    pub user_id: String,
}

impl SessionState {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            mode: self.mode.clone(),
            context: self.context.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Watch channel seeded with the default snapshot.
pub fn snapshot_channel() -> (watch::Sender<StateSnapshot>, watch::Receiver<StateSnapshot>) {
    watch::channel(SessionState::default().snapshot())
}
