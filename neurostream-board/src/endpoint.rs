//! Candidate connection descriptors produced by discovery

use serde::{Deserialize, Serialize};

/// How the host reaches the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Board wired directly over a USB serial port.
    SerialUsb,
    /// Paired radio link through the host's own radio interface.
    RadioDirect,
    /// Radio link through an external dongle on a serial port.
    RadioViaDongle,
}

/// One candidate connection, immutable once produced.
///
/// `path` is the host-visible device file (serial port or dongle port);
/// `address` is the board's radio address when known. For discovery-produced
/// endpoints the address is left empty and resolved by the dongle handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    pub transport: Transport,
    pub path: String,
    pub address: Option<String>,
}

impl DeviceEndpoint {
    pub fn serial_usb<S: Into<String>>(path: S) -> Self {
        Self {
            transport: Transport::SerialUsb,
            path: path.into(),
            address: None,
        }
    }

    pub fn radio_direct<S: Into<String>>(address: S) -> Self {
        Self {
            transport: Transport::RadioDirect,
            path: String::new(),
            address: Some(address.into()),
        }
    }

    pub fn radio_via_dongle<S: Into<String>>(dongle_path: S, address: Option<String>) -> Self {
        Self {
            transport: Transport::RadioViaDongle,
            path: dongle_path.into(),
            address,
        }
    }
}

impl std::fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transport {
            Transport::SerialUsb => write!(f, "serial:{}", self.path),
            Transport::RadioDirect => {
                write!(f, "radio:{}", self.address.as_deref().unwrap_or("?"))
            }
            Transport::RadioViaDongle => write!(
                f,
                "dongle:{}->{}",
                self.path,
                self.address.as_deref().unwrap_or("auto")
            ),
        }
    }
}

/// Connection parameters supplied by a client or the environment.
///
/// Precedence when resolving: dongle port (with or without a known address),
/// then a bare radio address, then a plain serial port. Anything unset falls
/// through to the discovery scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHint {
    pub serial_port: Option<String>,
    pub mac_address: Option<String>,
    pub dongle_port: Option<String>,
}

impl ConnectionHint {
    pub fn is_empty(&self) -> bool {
        self.serial_port.is_none() && self.mac_address.is_none() && self.dongle_port.is_none()
    }

    /// Build the explicit-address fast-path endpoint, if any field is set.
    pub fn explicit_endpoint(&self) -> Option<DeviceEndpoint> {
        if let Some(dongle) = &self.dongle_port {
            return Some(DeviceEndpoint::radio_via_dongle(
                dongle.clone(),
                self.mac_address.clone(),
            ));
        }
        if let Some(mac) = &self.mac_address {
            return Some(DeviceEndpoint::radio_direct(mac.clone()));
        }
        self.serial_port
            .as_ref()
            .map(|port| DeviceEndpoint::serial_usb(port.clone()))
    }

    /// Overlay `other` underneath `self`: set fields win, unset fall through.
    pub fn or(self, other: ConnectionHint) -> Self {
        Self {
            serial_port: self.serial_port.or(other.serial_port),
            mac_address: self.mac_address.or(other.mac_address),
            dongle_port: self.dongle_port.or(other.dongle_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dongle_port_takes_precedence() {
        let hint = ConnectionHint {
            serial_port: Some("/dev/ttyUSB0".into()),
            mac_address: Some("00:A0:C9:14:C8:29".into()),
            dongle_port: Some("/dev/cu.usbserial-D200".into()),
        };
        let ep = hint.explicit_endpoint().unwrap();
        assert_eq!(ep.transport, Transport::RadioViaDongle);
        assert_eq!(ep.path, "/dev/cu.usbserial-D200");
        assert_eq!(ep.address.as_deref(), Some("00:A0:C9:14:C8:29"));
    }

    #[test]
    fn bare_mac_is_radio_direct() {
        let hint = ConnectionHint {
            mac_address: Some("00:A0:C9:14:C8:29".into()),
            ..Default::default()
        };
        let ep = hint.explicit_endpoint().unwrap();
        assert_eq!(ep.transport, Transport::RadioDirect);
    }

    #[test]
    fn empty_hint_has_no_endpoint() {
        assert!(ConnectionHint::default().explicit_endpoint().is_none());
        assert!(ConnectionHint::default().is_empty());
    }

    #[test]
    fn overlay_prefers_upper_layer() {
        let message = ConnectionHint {
            serial_port: Some("/dev/ttyACM1".into()),
            ..Default::default()
        };
        let env = ConnectionHint {
            serial_port: Some("/dev/ttyACM0".into()),
            dongle_port: Some("/dev/ttyUSB2".into()),
            ..Default::default()
        };
        let merged = message.or(env);
        assert_eq!(merged.serial_port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(merged.dongle_port.as_deref(), Some("/dev/ttyUSB2"));
    }
}
