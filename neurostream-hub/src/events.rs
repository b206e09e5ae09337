use neurostream_dsp::MetricSample;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event types broadcast to WebSocket clients
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    /// Session mode changed (also sent as catch-up to new clients)
    #[serde(rename = "mode_changed")]
    ModeChanged { mode: String },

    /// Acquisition loop is running
    #[serde(rename = "recording_started")]
    RecordingStarted,

    /// Acquisition loop has stopped
    #[serde(rename = "recording_stopped")]
    RecordingStopped,

    /// Extracted metrics for one sample window
    #[serde(rename = "eeg_data")]
    EegData {
        data: MetricSample,
        /// Mode in effect when the window was captured, not when it was sent.
        mode: String,
        timestamp: f64,
    },

    /// Informational notice (e.g. duplicate start request)
    #[serde(rename = "info")]
    Info { message: String },

    #[serde(rename = "error")]
    Error { message: String },
}

impl BroadcastEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Convert event to its wire JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Control messages accepted from WebSocket clients
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "set_mode")]
    SetMode { mode: String },

    #[serde(rename = "set_context")]
    SetContext { context: Map<String, Value> },

    #[serde(rename = "set_user")]
    SetUser { user_id: String },

    /// All connection fields are optional; missing ones fall back to config
    /// defaults and finally port discovery.
    #[serde(rename = "start_recording")]
    StartRecording {
        #[serde(default)]
        serial_port: Option<String>,
        #[serde(default)]
        mac_address: Option<String>,
        #[serde(default)]
        dongle_port: Option<String>,
    },

    #[serde(rename = "stop_recording")]
    StopRecording,
}

/// Why an inbound frame could not be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not JSON at all.
    InvalidJson,
    /// Valid JSON, but not a known control message.
    InvalidMessage,
}

impl ControlMessage {
    /// Two-stage parse so clients get told whether their frame was broken
    /// JSON or merely an unknown message shape.
    pub fn parse(raw: &str) -> Result<Self, ParseFailure> {
        let value: Value = serde_json::from_str(raw).map_err(|_| ParseFailure::InvalidJson)?;
        serde_json::from_value(value).map_err(|_| ParseFailure::InvalidMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_mode_changed_serialization() {
        let event = BroadcastEvent::ModeChanged {
            mode: "study".to_string(),
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"mode_changed\""));
        assert!(json.contains("\"mode\":\"study\""));
    }

    #[test]
    fn test_unit_events_carry_only_their_tag() {
        let json = BroadcastEvent::RecordingStarted.to_json().unwrap();
        assert_eq!(json, "{\"type\":\"recording_started\"}");
        let json = BroadcastEvent::RecordingStopped.to_json().unwrap();
        assert_eq!(json, "{\"type\":\"recording_stopped\"}");
    }

    #[test]
    fn test_eeg_data_serialization() {
        let event = BroadcastEvent::EegData {
            data: MetricSample {
                timestamp: Utc::now(),
                alpha: 12.0,
                beta: 4.0,
                theta: 6.0,
                gamma: 1.0,
                focus_score: 80.0,
                load_score: 17.0,
                anomaly_score: 34.0,
            },
            mode: "meeting".to_string(),
            timestamp: 1_699_000_000.5,
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"eeg_data\""));
        assert!(json.contains("\"mode\":\"meeting\""));
        assert!(json.contains("\"focus_score\":80.0"));
    }

    #[test]
    fn test_control_parse_start_with_partial_fields() {
        let msg = ControlMessage::parse(
            "{\"type\":\"start_recording\",\"dongle_port\":\"/dev/cu.usbserial-D200\"}",
        )
        .unwrap();
        match msg {
            ControlMessage::StartRecording {
                serial_port,
                mac_address,
                dongle_port,
            } => {
                assert!(serial_port.is_none());
                assert!(mac_address.is_none());
                assert_eq!(dongle_port.as_deref(), Some("/dev/cu.usbserial-D200"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_control_parse_stop_recording() {
        let msg = ControlMessage::parse("{\"type\":\"stop_recording\"}").unwrap();
        assert!(matches!(msg, ControlMessage::StopRecording));
    }

    #[test]
    fn test_control_parse_distinguishes_failures() {
        assert_eq!(
            ControlMessage::parse("not json at all").err(),
            Some(ParseFailure::InvalidJson)
        );
        assert_eq!(
            ControlMessage::parse("{\"type\":\"launch_missiles\"}").err(),
            Some(ParseFailure::InvalidMessage)
        );
        assert_eq!(
            ControlMessage::parse("{\"type\":\"set_mode\"}").err(),
            Some(ParseFailure::InvalidMessage)
        );
    }
}
