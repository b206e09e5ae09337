//! Board backends: one concrete implementation per transport
//!
//! The acquisition side only ever sees the `BoardBackend` trait, so tests
//! and `--synthetic` runs swap in `SyntheticBoard` without touching the
//! session or loop code.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, warn};

use crate::endpoint::{DeviceEndpoint, Transport};
use crate::error::{BoardError, Result};
use crate::protocol::FrameParser;

/// Command bytes understood by the board firmware.
const CMD_SOFT_RESET: &[u8] = b"v";
const CMD_START_STREAM: &[u8] = b"b";
const CMD_STOP_STREAM: &[u8] = b"s";

/// Banner terminator sent after a soft reset.
const RESET_BANNER_END: &str = "$$$";

/// Low-level link parameters shared by the serial transports.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Per-attempt handshake timeout; silence beyond it is retryable.
    pub handshake_timeout: Duration,
    /// Dongle radio scans legitimately take 10-15 s.
    pub scan_timeout: Duration,
    pub sample_rate: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            handshake_timeout: Duration::from_secs(3),
            scan_timeout: Duration::from_secs(15),
            sample_rate: 200,
        }
    }
}

/// Exclusive handle to one physical board.
pub trait BoardBackend: Send {
    /// Open the link and verify the device answers. Must be called first.
    fn handshake(&mut self) -> Result<()>;

    fn start_stream(&mut self) -> Result<()>;

    fn stop_stream(&mut self) -> Result<()>;

    /// Drain whatever samples arrived since the last call (primary channel,
    /// microvolts). Returns empty rather than blocking when nothing is
    /// buffered.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    /// Release the hardware. Idempotent.
    fn release(&mut self);

    fn sample_rate(&self) -> u32;
}

/// Creates backends for endpoints; the session owns one of these so tests
/// can inject synthetic or failing boards.
pub trait BackendFactory: Send {
    fn create(
        &self,
        endpoint: &DeviceEndpoint,
        address: Option<&str>,
    ) -> Result<Box<dyn BoardBackend>>;
}

/// Production factory mapping each transport to its serial implementation.
pub struct DefaultBackendFactory {
    pub settings: LinkSettings,
    /// Host radio device file used to service `RadioDirect` endpoints.
    pub builtin_radio_path: Option<String>,
}

impl DefaultBackendFactory {
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            settings,
            builtin_radio_path: None,
        }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(
        &self,
        endpoint: &DeviceEndpoint,
        address: Option<&str>,
    ) -> Result<Box<dyn BoardBackend>> {
        let address = address
            .map(str::to_string)
            .or_else(|| endpoint.address.clone());

        match endpoint.transport {
            Transport::SerialUsb => Ok(Box::new(SerialBoard::new(
                endpoint.path.clone(),
                self.settings.clone(),
            ))),
            Transport::RadioViaDongle => Ok(Box::new(DongleBoard::new(
                endpoint.path.clone(),
                address,
                self.settings.clone(),
            ))),
            Transport::RadioDirect => match &self.builtin_radio_path {
                Some(radio) => Ok(Box::new(DongleBoard::new(
                    radio.clone(),
                    address,
                    self.settings.clone(),
                ))),
                None => Err(BoardError::terminal(
                    "direct radio connect needs a host radio interface; \
                     set board.builtin_radio_path in config.toml or supply a dongle_port",
                )),
            },
        }
    }
}

/// Board wired directly over USB serial.
pub struct SerialBoard {
    path: String,
    settings: LinkSettings,
    port: Option<Box<dyn SerialPort>>,
    parser: FrameParser,
}

impl SerialBoard {
    pub fn new(path: String, settings: LinkSettings) -> Self {
        Self {
            path,
            settings,
            port: None,
            parser: FrameParser::new(),
        }
    }
}

impl BoardBackend for SerialBoard {
    fn handshake(&mut self) -> Result<()> {
        let mut port = open_port(&self.path, &self.settings)?;
        port.write_all(CMD_SOFT_RESET)
            .map_err(|e| BoardError::retryable(format!("reset write failed: {e}")))?;
        let banner = read_until(&mut *port, RESET_BANNER_END, self.settings.handshake_timeout)
            .ok_or_else(|| {
                BoardError::retryable(format!(
                    "no reset banner from {} within {:?}",
                    self.path, self.settings.handshake_timeout
                ))
            })?;
        if banner.contains("FAILURE") {
            return Err(BoardError::terminal(format!(
                "board on {} rejected handshake: {}",
                self.path,
                banner.trim()
            )));
        }
        debug!(port = %self.path, "serial board handshake complete");
        self.port = Some(port);
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(BoardError::NotConnected)?;
        port.write_all(CMD_START_STREAM)
            .map_err(|e| BoardError::StreamInterrupted(e.to_string()))?;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            let _ = port.write_all(CMD_STOP_STREAM);
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let port = self.port.as_mut().ok_or(BoardError::NotConnected)?;
        drain_frames(port.as_mut(), &mut self.parser)
    }

    fn release(&mut self) {
        self.port = None;
    }

    fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }
}

/// Radio link through a BLE dongle on a serial port.
///
/// With a known address the dongle connects directly; without one it runs
/// its own discovery scan, which is the slow path (10-15 s).
pub struct DongleBoard {
    dongle_path: String,
    target_address: Option<String>,
    settings: LinkSettings,
    port: Option<Box<dyn SerialPort>>,
    parser: FrameParser,
}

impl DongleBoard {
    pub fn new(dongle_path: String, target_address: Option<String>, settings: LinkSettings) -> Self {
        Self {
            dongle_path,
            target_address,
            settings,
            port: None,
            parser: FrameParser::new(),
        }
    }

    fn link_to(port: &mut dyn SerialPort, address: &str, timeout: Duration) -> Result<()> {
        port.write_all(format!("connect {address}\n").as_bytes())
            .map_err(|e| BoardError::retryable(format!("dongle write failed: {e}")))?;
        let reply = read_until(port, "\n", timeout)
            .ok_or_else(|| BoardError::retryable(format!("no reply for connect {address}")))?;
        if reply.contains("CONNECTED") {
            Ok(())
        } else {
            Err(BoardError::terminal(format!(
                "dongle refused link to {address}: {}",
                reply.trim()
            )))
        }
    }
}

impl BoardBackend for DongleBoard {
    fn handshake(&mut self) -> Result<()> {
        let mut port = open_port(&self.dongle_path, &self.settings)?;

        let address = match &self.target_address {
            Some(addr) => addr.clone(),
            None => {
                // No address known: ask the dongle to scan. Silence within
                // the scan window means no board in range - retryable so the
                // caller advances to the next candidate port.
                port.write_all(b"scan\n")
                    .map_err(|e| BoardError::retryable(format!("dongle write failed: {e}")))?;
                let reply = read_until(&mut *port, "DEVICE ", self.settings.scan_timeout)
                    .and_then(|_| read_until(&mut *port, "\n", self.settings.handshake_timeout))
                    .ok_or_else(|| {
                        BoardError::retryable(format!(
                            "no board answered scan on {} within {:?}",
                            self.dongle_path, self.settings.scan_timeout
                        ))
                    })?;
                let addr = reply.split_whitespace().next().unwrap_or("").to_string();
                if addr.is_empty() {
                    return Err(BoardError::retryable(format!(
                        "malformed scan reply on {}",
                        self.dongle_path
                    )));
                }
                debug!(port = %self.dongle_path, address = %addr, "scan resolved board address");
                addr
            }
        };

        Self::link_to(&mut *port, &address, self.settings.handshake_timeout)?;
        self.target_address = Some(address);
        self.port = Some(port);
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(BoardError::NotConnected)?;
        port.write_all(CMD_START_STREAM)
            .map_err(|e| BoardError::StreamInterrupted(e.to_string()))?;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            let _ = port.write_all(CMD_STOP_STREAM);
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let port = self.port.as_mut().ok_or(BoardError::NotConnected)?;
        drain_frames(port.as_mut(), &mut self.parser)
    }

    fn release(&mut self) {
        self.port = None;
    }

    fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }
}

/// Deterministic signal generator satisfying the backend trait without
/// hardware. Emits an alpha-dominant mixture so derived metrics are stable.
pub struct SyntheticBoard {
    sample_rate: u32,
    samples_per_read: usize,
    cursor: u64,
}

impl SyntheticBoard {
    pub fn new(sample_rate: u32, samples_per_read: usize) -> Self {
        Self {
            sample_rate,
            samples_per_read,
            cursor: 0,
        }
    }
}

impl BoardBackend for SyntheticBoard {
    fn handshake(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let rate = self.sample_rate as f32;
        let mut out = Vec::with_capacity(self.samples_per_read);
        for _ in 0..self.samples_per_read {
            let t = self.cursor as f32 / rate;
            let alpha = 30.0 * (2.0 * std::f32::consts::PI * 10.0 * t).sin();
            let theta = 10.0 * (2.0 * std::f32::consts::PI * 6.0 * t).sin();
            let beta = 8.0 * (2.0 * std::f32::consts::PI * 21.0 * t).sin();
            // Cheap deterministic jitter, well below the signal amplitude.
            let noise = ((self.cursor.wrapping_mul(2654435761) >> 16) & 0xFF) as f32 / 255.0 - 0.5;
            out.push(alpha + theta + beta + noise);
            self.cursor += 1;
        }
        Ok(out)
    }

    fn release(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Factory producing synthetic boards for any endpoint.
pub struct SyntheticBackendFactory {
    pub sample_rate: u32,
    pub samples_per_read: usize,
}

impl Default for SyntheticBackendFactory {
    fn default() -> Self {
        Self {
            sample_rate: 250,
            samples_per_read: 250,
        }
    }
}

impl BackendFactory for SyntheticBackendFactory {
    fn create(
        &self,
        _endpoint: &DeviceEndpoint,
        _address: Option<&str>,
    ) -> Result<Box<dyn BoardBackend>> {
        Ok(Box::new(SyntheticBoard::new(
            self.sample_rate,
            self.samples_per_read,
        )))
    }
}

fn open_port(path: &str, settings: &LinkSettings) -> Result<Box<dyn SerialPort>> {
    serialport::new(path, settings.baud_rate)
        // Short read timeout; longer waits are deadline loops in read_until.
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => {
                BoardError::retryable(format!("{path}: device vanished during open"))
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                BoardError::terminal(format!("{path}: port busy or access denied"))
            }
            _ => BoardError::retryable(format!("{path}: open failed: {e}")),
        })
}

/// Accumulate reads until `pattern` appears or the deadline passes.
fn read_until(port: &mut dyn SerialPort, pattern: &str, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    let mut collected = String::new();
    let mut chunk = [0u8; 256];

    while Instant::now() < deadline {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                collected.push_str(&String::from_utf8_lossy(&chunk[..n]));
                if collected.contains(pattern) {
                    return Some(collected);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("serial read error during handshake: {e}");
                return None;
            }
        }
    }
    None
}

/// Non-blocking drain of buffered bytes into decoded primary-channel samples.
fn drain_frames(port: &mut dyn SerialPort, parser: &mut FrameParser) -> Result<Vec<f32>> {
    let mut samples = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let available = port
            .bytes_to_read()
            .map_err(|e| BoardError::StreamInterrupted(e.to_string()))?;
        if available == 0 {
            break;
        }
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                for frame in parser.feed(&chunk[..n]) {
                    samples.push(frame.channels[0]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(BoardError::StreamInterrupted(e.to_string())),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_board_is_deterministic() {
        let mut a = SyntheticBoard::new(250, 100);
        let mut b = SyntheticBoard::new(250, 100);
        assert_eq!(a.read_samples().unwrap(), b.read_samples().unwrap());
    }

    #[test]
    fn synthetic_board_advances_between_reads() {
        let mut board = SyntheticBoard::new(250, 50);
        let first = board.read_samples().unwrap();
        let second = board.read_samples().unwrap();
        assert_eq!(first.len(), 50);
        assert_ne!(first, second);
    }

    #[test]
    fn radio_direct_without_host_radio_is_terminal() {
        let factory = DefaultBackendFactory::new(LinkSettings::default());
        let ep = DeviceEndpoint::radio_direct("00:A0:C9:14:C8:29");
        let err = factory.create(&ep, None).err().unwrap();
        assert!(!err.is_retryable());
    }

    #[test]
    fn radio_direct_with_host_radio_builds_dongle_backend() {
        let mut factory = DefaultBackendFactory::new(LinkSettings::default());
        factory.builtin_radio_path = Some("/dev/ttyACM9".to_string());
        let ep = DeviceEndpoint::radio_direct("00:A0:C9:14:C8:29");
        assert!(factory.create(&ep, None).is_ok());
    }
}
