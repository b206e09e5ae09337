//! NeuroStream streaming hub
//!
//! The hub is a single actor task owning session state (mode, context,
//! user, recording flag) and the connected-client registry. WebSocket
//! clients steer it with control messages; while a recording is active, an
//! acquisition loop pulls sample windows off the board, extracts metrics,
//! persists them, and feeds them back to the hub for fan-out.
//!
//! ```text
//! ws clients <-> server.rs <-> StreamHub (actor) <-> AcquisitionLoop
//!                                  |                     |
//!                             ClientRegistry      DeviceSession + store
//! ```

pub mod acquisition;
pub mod client;
pub mod error;
pub mod events;
pub mod hub;
pub mod server;
pub mod state;

pub use acquisition::DEFAULT_POLL_PERIOD;
pub use client::ClientId;
pub use error::{HubError, Result};
pub use events::{BroadcastEvent, ControlMessage};
pub use hub::{
    BoardConnector, HubCommand, HubConfig, HubHandle, SessionConnector, StreamHub,
    SyntheticConnector,
};
pub use state::{SessionState, StateSnapshot};
