//! NeuroStream board layer
//!
//! Discovery, connection, and raw sample acquisition for one exclusive EEG
//! board. The rest of the system only sees three seams:
//!
//! ```text
//! DeviceLocator (serialport enumeration)
//!   |
//!   v  ordered DeviceEndpoint candidates
//! DeviceSession (state machine + two-tier connect policy)
//!   |
//!   v  BoardBackend trait: SerialBoard | DongleBoard | SyntheticBoard
//! FrameParser (24-bit framed wire protocol)
//! ```
//!
//! `pull_window` hands out whole sample windows only; short reads stay
//! buffered so downstream metric extraction never sees a partial window.

pub mod backend;
pub mod endpoint;
pub mod error;
pub mod locator;
pub mod protocol;
pub mod session;

pub use backend::{
    BackendFactory, BoardBackend, DefaultBackendFactory, LinkSettings, SyntheticBackendFactory,
    SyntheticBoard,
};
pub use endpoint::{ConnectionHint, DeviceEndpoint, Transport};
pub use error::{BoardError, Result};
pub use locator::{DeviceLocator, EndpointSource};
pub use protocol::{Frame, FrameParser};
pub use session::{DeviceSession, SessionPhase, DEFAULT_MIN_WINDOW_SAMPLES};
