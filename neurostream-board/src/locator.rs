//! Host serial-port discovery for candidate board endpoints

use serialport::{SerialPortType, available_ports};
use tracing::debug;

use crate::endpoint::DeviceEndpoint;

/// Name fragments that are never a board or dongle port.
const SKIP_PATTERNS: &[&str] = &["bluetooth-incoming", "debuglink", "debug-console", "wlan"];

/// Name fragments marking the preferred (non-legacy) device-file class.
/// macOS callout ports and Linux USB CDC/FTDI nodes connect reliably; the
/// matching `tty.` dial-in nodes are kept as late fallbacks.
const PREFERRED_PATTERNS: &[&str] = &["/cu.", "ttyusb", "ttyacm"];

/// Source of candidate endpoints. `DeviceLocator` reads the host OS; tests
/// substitute a fixed list.
pub trait EndpointSource {
    fn discover(&self) -> Vec<DeviceEndpoint>;
}

/// Enumerates host serial ports and orders them into connection candidates.
///
/// Pure read of OS device enumeration: no side effects, safe to call
/// repeatedly, returns an empty list (never an error) when nothing is found.
#[derive(Debug, Default)]
pub struct DeviceLocator;

impl DeviceLocator {
    pub fn new() -> Self {
        Self
    }

    /// List raw candidate port names, ordered and filtered.
    pub fn candidate_ports(&self) -> Vec<String> {
        let ports = available_ports().unwrap_or_default();
        let mut names: Vec<String> = Vec::new();

        for port in ports {
            // PCI UARTs and unknown buses are rarely a board link; USB and
            // Bluetooth-class ports are kept, as is anything unclassified
            // by name only.
            match port.port_type {
                SerialPortType::PciPort => continue,
                _ => names.push(port.port_name),
            }
        }

        let ordered = order_candidates(names);
        debug!(candidates = ?ordered, "serial port discovery");
        ordered
    }
}

impl EndpointSource for DeviceLocator {
    fn discover(&self) -> Vec<DeviceEndpoint> {
        self.candidate_ports()
            .into_iter()
            // Address discovery is deferred to the dongle handshake itself,
            // mirroring how an explicit-address connect skips the scan.
            .map(|path| DeviceEndpoint::radio_via_dongle(path, None))
            .collect()
    }
}

fn is_excluded(name: &str) -> bool {
    let lower = name.to_lowercase();
    SKIP_PATTERNS.iter().any(|p| lower.contains(p))
}

fn is_preferred(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Order port names: preferred device-file class first, legacy equivalents
/// after, excluded patterns dropped. Relative enumeration order is preserved
/// within each class.
fn order_candidates(names: Vec<String>) -> Vec<String> {
    let mut preferred = Vec::new();
    let mut legacy = Vec::new();

    for name in names {
        if is_excluded(&name) {
            continue;
        }
        if is_preferred(&name) {
            if !preferred.contains(&name) {
                preferred.push(name);
            }
        } else if !legacy.contains(&name) {
            legacy.push(name);
        }
    }

    preferred.extend(legacy);
    preferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Transport;

    #[test]
    fn preferred_ports_come_first() {
        let ordered = order_candidates(vec![
            "/dev/tty.usbserial-D200".to_string(),
            "/dev/cu.usbserial-D200".to_string(),
            "/dev/ttyUSB0".to_string(),
        ]);
        assert_eq!(
            ordered,
            vec![
                "/dev/cu.usbserial-D200".to_string(),
                "/dev/ttyUSB0".to_string(),
                "/dev/tty.usbserial-D200".to_string(),
            ]
        );
    }

    #[test]
    fn radio_stack_debug_ports_are_excluded() {
        let ordered = order_candidates(vec![
            "/dev/cu.Bluetooth-Incoming-Port".to_string(),
            "/dev/cu.debuglink".to_string(),
            "/dev/cu.usbmodem11".to_string(),
        ]);
        assert_eq!(ordered, vec!["/dev/cu.usbmodem11".to_string()]);
    }

    #[test]
    fn duplicates_are_dropped() {
        let ordered = order_candidates(vec![
            "/dev/ttyUSB0".to_string(),
            "/dev/ttyUSB0".to_string(),
        ]);
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn discovery_yields_dongle_endpoints_without_addresses() {
        struct Fixed;
        impl EndpointSource for Fixed {
            fn discover(&self) -> Vec<DeviceEndpoint> {
                order_candidates(vec!["/dev/ttyUSB0".to_string()])
                    .into_iter()
                    .map(|p| DeviceEndpoint::radio_via_dongle(p, None))
                    .collect()
            }
        }
        let eps = Fixed.discover();
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].transport, Transport::RadioViaDongle);
        assert!(eps[0].address.is_none());
    }
}
