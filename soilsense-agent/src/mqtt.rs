//! MQTT wiring for the agent: telemetry publishing and remote methods

use anyhow::{anyhow, Context};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actuator::Relay;
use crate::config::MqttConfig;
use crate::messages::{method_response_topic, methods_topic, telemetry_topic, MethodRequest, MethodResponse, TelemetryMessage};
use crate::monitor::{PublishError, SoilMoistureMonitor, TelemetrySink};
use crate::sensor::AnalogInput;

/// Build the MQTT client for this device.
pub fn connect(config: &MqttConfig, device_id: &str) -> (AsyncClient, EventLoop) {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("soilsense-agent-{}", device_id));

    let mut mqtt_options = MqttOptions::new(client_id, &config.broker_host, config.broker_port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
    mqtt_options.set_clean_session(true);

    AsyncClient::new(mqtt_options, 10)
}

/// Telemetry sink publishing on the device telemetry topic
#[derive(Clone)]
pub struct MqttTelemetry {
    client: AsyncClient,
    topic: String,
}

impl MqttTelemetry {
    pub fn new(client: AsyncClient, device_id: &str) -> Self {
        Self {
            client,
            topic: telemetry_topic(device_id),
        }
    }
}

impl TelemetrySink for MqttTelemetry {
    /// Never waits on the request queue: with the broker down the queue is not
    /// drained, and a full queue fails this cycle instead of stalling polling.
    async fn send_telemetry(&self, message: &TelemetryMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Drive the MQTT event loop and dispatch remote methods.
///
/// Each method request is handled on its own task so a slow relay write
/// never stalls the event loop or the polling cadence.
pub fn spawn_command_listener<S, R, T>(
    mut eventloop: EventLoop,
    client: AsyncClient,
    monitor: Arc<SoilMoistureMonitor<S, R, T>>,
    device_id: String,
) -> JoinHandle<()>
where
    S: AnalogInput + 'static,
    R: Relay + 'static,
    T: TelemetrySink + 'static,
{
    tokio::spawn(async move {
        let command_topic = methods_topic(&device_id);
        let response_topic = method_response_topic(&device_id);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    // clean session: subscriptions are lost on every reconnect
                    match client.try_subscribe(&command_topic, QoS::AtLeastOnce) {
                        Ok(()) => info!("Subscribed to commands on: {}", command_topic),
                        Err(e) => error!("Failed to subscribe to {}: {}", command_topic, e),
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) if publish.topic == command_topic => {
                    let request: MethodRequest = match serde_json::from_slice(&publish.payload) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!("Ignoring malformed method request on {}: {}", publish.topic, e);
                            continue;
                        }
                    };

                    let monitor = monitor.clone();
                    let client = client.clone();
                    let topic = response_topic.clone();
                    tokio::spawn(async move {
                        let response = monitor.handle_request(&request).await;
                        if let Err(e) = publish_response(&client, &topic, &response).await {
                            error!("Failed to send method response {}: {}", response.request_id, e);
                        }
                    });
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    debug!("Received MQTT message on topic: {}", publish.topic);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    })
}

/// Run the polling loop while watching the command listener.
///
/// Returns when polling completes, or with an error as soon as the listener
/// task ends (it only ends on panic or abort).
pub async fn run_with_listener<F>(polling: F, listener: JoinHandle<()>) -> anyhow::Result<()>
where
    F: Future,
{
    tokio::select! {
        _ = polling => Ok(()),
        joined = listener => {
            joined.context("MQTT command listener crashed")?;
            Err(anyhow!("MQTT command listener stopped"))
        }
    }
}

async fn publish_response(
    client: &AsyncClient,
    topic: &str,
    response: &MethodResponse,
) -> Result<(), PublishError> {
    let payload = serde_json::to_vec(response)?;
    client
        .try_publish(topic, QoS::AtLeastOnce, false, payload)
        .map_err(|e| PublishError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorReading;

    fn offline_config() -> MqttConfig {
        MqttConfig {
            broker_host: "127.0.0.1".into(),
            broker_port: soilsense_devkit::unused_local_port(),
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn test_telemetry_fails_fast_when_queue_is_full() {
        // event loop never polled: nothing drains the request queue
        let (client, _eventloop) = connect(&offline_config(), "pot-1");
        let telemetry = MqttTelemetry::new(client, "pot-1");
        let message = TelemetryMessage::from_reading(&SensorReading { channel: 0, value: Some(42) });

        for _ in 0..10 {
            telemetry.send_telemetry(&message).await.unwrap();
        }

        let result = tokio::time::timeout(Duration::from_secs(1), telemetry.send_telemetry(&message)).await;
        assert!(matches!(result, Ok(Err(PublishError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_listener_panic_stops_the_agent() {
        let listener = tokio::spawn(async { panic!("listener exploded") });

        let err = run_with_listener(std::future::pending::<u64>(), listener)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "MQTT command listener crashed");
    }

    #[tokio::test]
    async fn test_polling_end_returns_ok() {
        let listener = tokio::spawn(std::future::pending::<()>());

        run_with_listener(async { 3u64 }, listener).await.unwrap();
    }

    #[tokio::test]
    async fn test_response_fails_fast_when_queue_is_full() {
        let (client, _eventloop) = connect(&offline_config(), "pot-1");
        let response = MethodResponse {
            request_id: "req-1".into(),
            status: 200,
            timestamp: chrono::Utc::now(),
        };
        let topic = method_response_topic("pot-1");

        for _ in 0..10 {
            publish_response(&client, &topic, &response).await.unwrap();
        }
        assert!(matches!(
            publish_response(&client, &topic, &response).await,
            Err(PublishError::Transport(_))
        ));
    }
}
