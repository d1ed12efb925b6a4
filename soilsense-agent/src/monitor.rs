//! Soil moisture monitor
//!
//! Ties the sensor, the relay and the telemetry channel together:
//! - Polling loop: read → publish → sleep, strictly sequential
//! - Remote method handler: relay_on / relay_off → relay

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::actuator::{ActuatorResult, Relay};
use crate::backend::BackendError;
use crate::clock::Clock;
use crate::messages::{status, MethodRequest, MethodResponse, TelemetryMessage, RELAY_OFF, RELAY_ON};
use crate::sensor::{AnalogInput, SensorReading};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode telemetry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("telemetry transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("sensor read failed: {0}")]
    Read(#[from] BackendError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Outbound telemetry channel
pub trait TelemetrySink: Send + Sync {
    fn send_telemetry(&self, message: &TelemetryMessage) -> impl Future<Output = Result<(), PublishError>> + Send;
}

pub struct SoilMoistureMonitor<S, R, T> {
    sensor: S,
    relay: R,
    sink: T,
    poll_interval: Duration,
}

impl<S, R, T> SoilMoistureMonitor<S, R, T>
where
    S: AnalogInput,
    R: Relay,
    T: TelemetrySink,
{
    pub fn new(sensor: S, relay: R, sink: T, poll_interval: Duration) -> Self {
        Self {
            sensor,
            relay,
            sink,
            poll_interval,
        }
    }

    /// One poll: read the default channel and publish the value.
    pub async fn get_reading(&self) -> Result<SensorReading, MonitorError> {
        let reading = self.sensor.read(None).await?;

        match reading.value {
            Some(value) => info!("Soil moisture: {}", value),
            None => debug!("Soil moisture unavailable on channel {}", reading.channel),
        }

        let message = TelemetryMessage::from_reading(&reading);
        self.sink.send_telemetry(&message).await?;
        Ok(reading)
    }

    /// Polling loop. Runs forever when `iterations` is `None`.
    ///
    /// A failed cycle is logged and the next one starts after the usual
    /// interval. Returns the number of completed cycles.
    pub async fn take_readings<C: Clock>(&self, clock: &C, iterations: Option<u64>) -> u64 {
        let mut completed: u64 = 0;

        while iterations.map_or(true, |max| completed < max) {
            if let Err(e) = self.get_reading().await {
                error!("Failed to take reading: {}", e);
            }
            completed += 1;
            clock.sleep(self.poll_interval).await;
        }

        completed
    }

    /// Apply a remote method to the relay and build the response.
    pub async fn handle_request(&self, request: &MethodRequest) -> MethodResponse {
        let status = match request.method_name.as_str() {
            RELAY_ON => status_of(self.relay.on().await),
            RELAY_OFF => status_of(self.relay.off().await),
            other => {
                warn!("Unknown method requested: {}", other);
                status::NOT_FOUND
            }
        };

        info!("Handled method {} ({}) -> {}", request.method_name, request.request_id, status);
        MethodResponse::for_request(request, status)
    }
}

fn status_of(result: ActuatorResult) -> u16 {
    if result.applied {
        status::OK
    } else {
        status::UNAVAILABLE
    }
}

#[cfg(test)]
const TEST_TELEMETRY_TOPIC: &str = "soilsense/devices/test/telemetry@v1";

#[cfg(test)]
impl TelemetrySink for soilsense_devkit::MockMqttClient {
    async fn send_telemetry(&self, message: &TelemetryMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)?;
        self.publish(TEST_TELEMETRY_TOPIC, rumqttc::QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}
