//! MQTT contracts between the agent and the hub
//!
//! - `soilsense/devices/{device_id}/telemetry@v1` - agent → hub readings
//! - `soilsense/devices/{device_id}/methods@v1` - hub → agent relay commands
//! - `soilsense/devices/{device_id}/methods/response@v1` - agent → hub status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensor::SensorReading;

pub const RELAY_ON: &str = "relay_on";
pub const RELAY_OFF: &str = "relay_off";

/// Method response status codes
pub mod status {
    pub const OK: u16 = 200;
    pub const NOT_FOUND: u16 = 404;
    pub const UNAVAILABLE: u16 = 503;
}

pub fn telemetry_topic(device_id: &str) -> String {
    format!("soilsense/devices/{}/telemetry@v1", device_id)
}

pub fn methods_topic(device_id: &str) -> String {
    format!("soilsense/devices/{}/methods@v1", device_id)
}

pub fn method_response_topic(device_id: &str) -> String {
    format!("soilsense/devices/{}/methods/response@v1", device_id)
}

/// Telemetry envelope (matches telemetry@v1 contract)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// `null` when the backend was unreachable for this poll
    pub soil_moisture: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryMessage {
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            soil_moisture: reading.value,
            timestamp: Utc::now(),
        }
    }
}

/// Incoming remote method (matches methods@v1 contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodRequest {
    pub request_id: String,
    pub method_name: String,
    #[serde(default)]
    pub payload: String,
}

/// Method response to the hub (matches methods/response@v1 contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResponse {
    pub request_id: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

impl MethodResponse {
    pub fn for_request(request: &MethodRequest, status: u16) -> Self {
        Self {
            request_id: request.request_id.clone(),
            status,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(telemetry_topic("pot-1"), "soilsense/devices/pot-1/telemetry@v1");
        assert_eq!(methods_topic("pot-1"), "soilsense/devices/pot-1/methods@v1");
        assert_eq!(
            method_response_topic("pot-1"),
            "soilsense/devices/pot-1/methods/response@v1"
        );
    }

    #[test]
    fn test_absent_reading_serializes_as_null() {
        let message = TelemetryMessage::from_reading(&SensorReading { channel: 0, value: None });
        let json = serde_json::to_value(&message).unwrap();

        assert!(json["soil_moisture"].is_null());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_method_request_from_hub() {
        let raw = r#"{"request_id":"abc","method_name":"relay_on","payload":"{}","timestamp":"2024-01-01T00:00:00Z"}"#;
        let request: MethodRequest = serde_json::from_str(raw).unwrap();

        assert_eq!(request.method_name, RELAY_ON);
        assert_eq!(request.payload, "{}");

        let response = MethodResponse::for_request(&request, status::OK);
        assert_eq!(response.request_id, "abc");
        assert_eq!(response.status, 200);
    }
}
