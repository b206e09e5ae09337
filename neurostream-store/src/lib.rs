//! NeuroStream persistence
//!
//! Two sinks for extracted metric events: a local SQLite `EventStore`
//! (authoritative, always present) and an optional `RemoteStore` replica.
//! The acquisition loop writes to both; only the local write is on the
//! critical path.

pub mod error;
pub mod event_store;
pub mod remote;

pub use error::{RemoteError, StoreError};
pub use event_store::{EventRecord, EventStore, StoredEvent, UserStats};
pub use remote::{Comparator, MemoryRemote, QueryFilter, RemoteStore};
