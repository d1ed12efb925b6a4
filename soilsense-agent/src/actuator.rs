//! Fail-soft relay
//!
//! Every write reports whether it reached the backend instead of raising.
//! Writes are never retried here; the remote command handler reports a
//! failed write upstream and lets the caller decide.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

use crate::backend::{BackendClient, BackendError};
use crate::connection::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub channel: u16,
    pub desired_state: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorResult {
    pub applied: bool,
}

/// Relay capability consumed by the remote command handler
pub trait Relay: Send + Sync {
    fn on(&self) -> impl Future<Output = ActuatorResult> + Send;
    fn off(&self) -> impl Future<Output = ActuatorResult> + Send;
}

pub struct FaultTolerantActuator {
    client: Arc<BackendClient>,
    channel: u16,
}

impl FaultTolerantActuator {
    pub fn new(
        client: Arc<BackendClient>,
        connection: &ConnectionState,
        channel: u16,
    ) -> Result<Self, BackendError> {
        connection.require_established()?;
        Ok(Self { client, channel })
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub async fn set_state(&self, channel: u16, desired_state: bool) -> ActuatorResult {
        self.apply(ActuatorCommand {
            channel,
            desired_state,
        })
        .await
    }

    pub async fn apply(&self, command: ActuatorCommand) -> ActuatorResult {
        match self
            .client
            .set_actuator_value(command.channel, command.desired_state)
            .await
        {
            Ok(()) => {
                debug!("Relay on channel {} set to {}", command.channel, command.desired_state);
                ActuatorResult { applied: true }
            }
            Err(e) => {
                error!(
                    "Could not set relay on channel {} to {}: {}",
                    command.channel, command.desired_state, e
                );
                ActuatorResult { applied: false }
            }
        }
    }
}

impl Relay for FaultTolerantActuator {
    async fn on(&self) -> ActuatorResult {
        self.set_state(self.channel, true).await
    }

    async fn off(&self) -> ActuatorResult {
        self.set_state(self.channel, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use soilsense_devkit::{unused_local_port, LogCapture};
    use std::time::Duration;

    fn relay_for(server: &Server, channel: u16) -> FaultTolerantActuator {
        let addr = server.socket_address();
        let host = addr.ip().to_string();
        let client = BackendClient::new(&host, addr.port(), Duration::from_secs(5)).unwrap();
        let state = ConnectionState::established(&host, addr.port());
        FaultTolerantActuator::new(Arc::new(client), &state, channel).unwrap()
    }

    fn disconnected_relay(channel: u16) -> FaultTolerantActuator {
        let port = unused_local_port();
        let client = BackendClient::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        let state = ConnectionState::established("127.0.0.1", port);
        FaultTolerantActuator::new(Arc::new(client), &state, channel).unwrap()
    }

    async fn mock_write(server: &mut Server, channel: &str, value: bool, status: usize) -> mockito::Mock {
        server
            .mock("POST", "/actuator_value")
            .match_query(Matcher::UrlEncoded("port".into(), channel.into()))
            .match_body(Matcher::Json(json!({ "value": value })))
            .with_status(status)
            .expect(1)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_relay_on_success() {
        let mut server = Server::new_async().await;
        let mock = mock_write(&mut server, "0", true, 200).await;

        let result = relay_for(&server, 0).on().await;

        assert!(result.applied);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_relay_off_success() {
        let mut server = Server::new_async().await;
        let mock = mock_write(&mut server, "0", false, 200).await;

        let result = relay_for(&server, 0).off().await;

        assert!(result.applied);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_relay_on_fail() {
        let (logs, _guard) = LogCapture::install();

        let result = disconnected_relay(0).on().await;

        assert_eq!(result, ActuatorResult { applied: false });
        assert_eq!(logs.errors(), 1);
    }

    #[tokio::test]
    async fn test_relay_off_fail() {
        let result = disconnected_relay(0).off().await;
        assert!(!result.applied);
    }

    #[tokio::test]
    async fn test_set_state_on_explicit_channel() {
        let mut server = Server::new_async().await;
        let mock = mock_write(&mut server, "7", true, 200).await;

        let result = relay_for(&server, 5).set_state(7, true).await;

        assert!(result.applied);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_not_applied() {
        let mut server = Server::new_async().await;
        let mock = mock_write(&mut server, "5", true, 500).await;

        let result = relay_for(&server, 5).on().await;

        assert!(!result.applied);
        mock.assert_async().await;
    }

    #[test]
    fn test_requires_established_connection() {
        let client = BackendClient::new("127.0.0.1", 5000, Duration::from_secs(5)).unwrap();
        let state = ConnectionState::new("127.0.0.1", 5000);

        assert!(FaultTolerantActuator::new(Arc::new(client), &state, 5).is_err());
    }
}
