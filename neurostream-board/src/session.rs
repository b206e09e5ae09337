//! Exclusive session against one physical board
//!
//! `DeviceSession` owns the connection state machine
//! (`Disconnected -> Connecting -> Connected -> Streaming -> Disconnected`)
//! and the two-tier connect policy: an explicit-address fast path, falling
//! back to a sequential discovery scan over the locator's ordered
//! candidates. Discovery attempts are sequential on purpose - the hardware
//! link is exclusive and parallel open attempts would contend for it.

use tracing::{info, warn};

use crate::backend::{BackendFactory, BoardBackend};
use crate::endpoint::{ConnectionHint, DeviceEndpoint};
use crate::error::{BoardError, Result};
use crate::locator::EndpointSource;

/// Fewest buffered samples that constitute a usable window. Below this,
/// `pull_window` reports nothing rather than surfacing a partial window.
pub const DEFAULT_MIN_WINDOW_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

pub struct DeviceSession {
    factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn BoardBackend>>,
    phase: SessionPhase,
    window: Vec<f32>,
    min_window_samples: usize,
}

impl DeviceSession {
    pub fn new(factory: Box<dyn BackendFactory>, min_window_samples: usize) -> Self {
        Self {
            factory,
            backend: None,
            phase: SessionPhase::Disconnected,
            window: Vec::new(),
            min_window_samples,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.sample_rate())
    }

    /// Attempt a handshake against one endpoint. The session ends up
    /// `Connected` on success and `Disconnected` on failure.
    pub fn connect(&mut self, endpoint: &DeviceEndpoint, address: Option<&str>) -> Result<()> {
        if self.backend.is_some() {
            // Hardware is exclusive; an existing link must be released first.
            return Err(BoardError::terminal("session already connected"));
        }

        self.phase = SessionPhase::Connecting;
        let attempt = self
            .factory
            .create(endpoint, address)
            .and_then(|mut backend| backend.handshake().map(|()| backend));

        match attempt {
            Ok(backend) => {
                info!(endpoint = %endpoint, "board connected");
                self.backend = Some(backend);
                self.phase = SessionPhase::Connected;
                Ok(())
            }
            Err(e) => {
                self.phase = SessionPhase::Disconnected;
                Err(e)
            }
        }
    }

    /// Two-tier connection policy: hints with an explicit path/address are
    /// tried directly (fast, no scan); otherwise the locator's candidates
    /// are attempted in order until one handshakes. Returns the endpoint
    /// that won.
    pub fn connect_auto(
        &mut self,
        hint: &ConnectionHint,
        source: &dyn EndpointSource,
    ) -> Result<DeviceEndpoint> {
        if let Some(endpoint) = hint.explicit_endpoint() {
            let address = endpoint.address.clone();
            self.connect(&endpoint, address.as_deref())?;
            return Ok(endpoint);
        }

        let candidates = source.discover();
        if candidates.is_empty() {
            return Err(BoardError::NoDeviceFound(
                "no candidate ports found; plug in the board or dongle, \
                 or set serial_port / dongle_port explicitly"
                    .to_string(),
            ));
        }

        let total = candidates.len();
        for (idx, endpoint) in candidates.iter().enumerate() {
            match self.connect(endpoint, None) {
                Ok(()) => return Ok(endpoint.clone()),
                Err(e) if e.is_retryable() => {
                    warn!(endpoint = %endpoint, attempt = idx + 1, total, "candidate timed out: {e}");
                }
                Err(e) => {
                    // Terminal for this endpoint only; the next candidate
                    // may still be the right port.
                    warn!(endpoint = %endpoint, attempt = idx + 1, total, "candidate rejected: {e}");
                }
            }
        }

        Err(BoardError::NoDeviceFound(format!(
            "all {total} candidate ports failed; power the board on and retry, \
             or set mac_address / dongle_port to skip the scan"
        )))
    }

    /// Begin streaming samples from a connected board.
    pub fn start_stream(&mut self) -> Result<()> {
        let backend = self.backend.as_mut().ok_or(BoardError::NotConnected)?;
        backend.start_stream()?;
        self.phase = SessionPhase::Streaming;
        Ok(())
    }

    /// Drain buffered samples into the pending window and hand it over once
    /// it reaches the minimum size. Returns promptly with `None` while the
    /// window is still short - never a partial window.
    pub fn pull_window(&mut self) -> Result<Option<Vec<f32>>> {
        let backend = self.backend.as_mut().ok_or(BoardError::NotConnected)?;
        let fresh = backend.read_samples()?;
        self.window.extend_from_slice(&fresh);

        if self.window.len() >= self.min_window_samples {
            Ok(Some(std::mem::take(&mut self.window)))
        } else {
            Ok(None)
        }
    }

    /// Idempotent teardown: stops any stream, releases the hardware handle,
    /// discards the pending window.
    pub fn disconnect(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            let _ = backend.stop_stream();
            backend.release();
            info!("board disconnected");
        }
        self.window.clear();
        self.phase = SessionPhase::Disconnected;
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBoard;
    use std::sync::{Arc, Mutex};

    /// Factory recording attempt order; fails endpoints listed in `reject`.
    struct ScriptedFactory {
        attempts: Arc<Mutex<Vec<String>>>,
        reject: Vec<(String, bool)>,
    }

    impl BackendFactory for ScriptedFactory {
        fn create(
            &self,
            endpoint: &DeviceEndpoint,
            _address: Option<&str>,
        ) -> crate::error::Result<Box<dyn BoardBackend>> {
            self.attempts.lock().unwrap().push(endpoint.path.clone());
            for (path, retryable) in &self.reject {
                if *path == endpoint.path {
                    return Err(if *retryable {
                        BoardError::retryable("scripted timeout")
                    } else {
                        BoardError::terminal("scripted rejection")
                    });
                }
            }
            Ok(Box::new(SyntheticBoard::new(250, 60)))
        }
    }

    struct FixedSource(Vec<DeviceEndpoint>);

    impl EndpointSource for FixedSource {
        fn discover(&self) -> Vec<DeviceEndpoint> {
            self.0.clone()
        }
    }

    fn session_with(reject: Vec<(String, bool)>) -> (DeviceSession, Arc<Mutex<Vec<String>>>) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory {
            attempts: Arc::clone(&attempts),
            reject,
        };
        (DeviceSession::new(Box::new(factory), 100), attempts)
    }

    #[test]
    fn explicit_hint_skips_discovery() {
        let (mut session, attempts) = session_with(vec![]);
        let hint = ConnectionHint {
            dongle_port: Some("/dev/cu.usbserial-D200".into()),
            ..Default::default()
        };
        let source = FixedSource(vec![DeviceEndpoint::radio_via_dongle("/dev/other", None)]);
        let won = session.connect_auto(&hint, &source).unwrap();
        assert_eq!(won.path, "/dev/cu.usbserial-D200");
        assert_eq!(attempts.lock().unwrap().as_slice(), ["/dev/cu.usbserial-D200"]);
        assert_eq!(session.phase(), SessionPhase::Connected);
    }

    #[test]
    fn discovery_tries_candidates_in_order_and_stops_at_first_success() {
        let (mut session, attempts) =
            session_with(vec![("/dev/cu.first".to_string(), true)]);
        let source = FixedSource(vec![
            DeviceEndpoint::radio_via_dongle("/dev/cu.first", None),
            DeviceEndpoint::radio_via_dongle("/dev/cu.second", None),
            DeviceEndpoint::radio_via_dongle("/dev/cu.third", None),
        ]);
        let won = session
            .connect_auto(&ConnectionHint::default(), &source)
            .unwrap();
        assert_eq!(won.path, "/dev/cu.second");
        assert_eq!(
            attempts.lock().unwrap().as_slice(),
            ["/dev/cu.first", "/dev/cu.second"]
        );
    }

    #[test]
    fn terminal_failure_on_one_endpoint_still_tries_the_next() {
        let (mut session, _) = session_with(vec![("/dev/a".to_string(), false)]);
        let source = FixedSource(vec![
            DeviceEndpoint::radio_via_dongle("/dev/a", None),
            DeviceEndpoint::radio_via_dongle("/dev/b", None),
        ]);
        let won = session
            .connect_auto(&ConnectionHint::default(), &source)
            .unwrap();
        assert_eq!(won.path, "/dev/b");
    }

    #[test]
    fn exhausting_all_candidates_reports_no_device() {
        let (mut session, _) = session_with(vec![
            ("/dev/a".to_string(), true),
            ("/dev/b".to_string(), true),
        ]);
        let source = FixedSource(vec![
            DeviceEndpoint::radio_via_dongle("/dev/a", None),
            DeviceEndpoint::radio_via_dongle("/dev/b", None),
        ]);
        let err = session
            .connect_auto(&ConnectionHint::default(), &source)
            .err()
            .unwrap();
        assert!(matches!(err, BoardError::NoDeviceFound(_)));
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn empty_discovery_reports_no_device() {
        let (mut session, _) = session_with(vec![]);
        let err = session
            .connect_auto(&ConnectionHint::default(), &FixedSource(vec![]))
            .err()
            .unwrap();
        assert!(matches!(err, BoardError::NoDeviceFound(_)));
    }

    #[test]
    fn pull_window_holds_back_short_windows() {
        // Synthetic board yields 60 samples per read; threshold is 100.
        let (mut session, _) = session_with(vec![]);
        let ep = DeviceEndpoint::serial_usb("/dev/any");
        session.connect(&ep, None).unwrap();
        session.start_stream().unwrap();

        assert!(session.pull_window().unwrap().is_none());
        let window = session.pull_window().unwrap().expect("second read crosses threshold");
        assert_eq!(window.len(), 120);
        // Buffer drained: next pull starts from zero again.
        assert!(session.pull_window().unwrap().is_none());
    }

    #[test]
    fn pull_window_without_connection_errors() {
        let (mut session, _) = session_with(vec![]);
        assert!(matches!(
            session.pull_window(),
            Err(BoardError::NotConnected)
        ));
    }

    #[test]
    fn disconnect_is_idempotent_and_allows_reconnect() {
        let (mut session, _) = session_with(vec![]);
        let ep = DeviceEndpoint::serial_usb("/dev/any");
        session.connect(&ep, None).unwrap();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        // No leaked exclusive handle: a fresh connect succeeds.
        session.connect(&ep, None).unwrap();
        assert_eq!(session.phase(), SessionPhase::Connected);
    }

    #[test]
    fn second_connect_while_connected_is_refused() {
        let (mut session, _) = session_with(vec![]);
        let ep = DeviceEndpoint::serial_usb("/dev/any");
        session.connect(&ep, None).unwrap();
        assert!(session.connect(&ep, None).is_err());
    }
}
