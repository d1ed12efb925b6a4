//! Fail-soft analog sensor
//!
//! Wraps the backend client and turns a lost connection into an absent
//! reading, so one bad poll never takes the agent down.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::backend::{BackendClient, BackendError};
use crate::connection::ConnectionState;

/// Single value read from a sensor channel.
///
/// `value` is `None` exactly when the backend could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub channel: u16,
    pub value: Option<i64>,
}

/// Analog read capability consumed by the monitor
pub trait AnalogInput: Send + Sync {
    /// Read `channel`, or the default channel when `None`.
    fn read(&self, channel: Option<u16>) -> impl Future<Output = Result<SensorReading, BackendError>> + Send;
}

pub struct FaultTolerantSensor {
    client: Arc<BackendClient>,
    default_channel: Option<u16>,
}

impl FaultTolerantSensor {
    pub fn new(
        client: Arc<BackendClient>,
        connection: &ConnectionState,
        default_channel: Option<u16>,
    ) -> Result<Self, BackendError> {
        connection.require_established()?;
        Ok(Self {
            client,
            default_channel,
        })
    }

    pub fn default_channel(&self) -> Option<u16> {
        self.default_channel
    }
}

impl AnalogInput for FaultTolerantSensor {
    async fn read(&self, channel: Option<u16>) -> Result<SensorReading, BackendError> {
        let channel = channel
            .or(self.default_channel)
            .ok_or(BackendError::MissingChannel)?;

        match self.client.sensor_value(channel).await {
            Ok(value) => Ok(SensorReading {
                channel,
                value: Some(value),
            }),
            Err(e) if e.is_unreachable() => {
                error!("Could not retrieve sensor value on channel {}: {}", channel, e);
                Ok(SensorReading {
                    channel,
                    value: None,
                })
            }
            Err(e) => Err(e),
        }
    }
}
