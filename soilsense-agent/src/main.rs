//! SoilSense Agent - device entry point
//!
//! Startup order matters: the hardware backend must answer before the sensor
//! and relay are built, and the polling loop only starts after that.

use anyhow::{Context, Result};
use soilsense_agent::{
    mqtt, AgentConfig, BackendClient, ConnectionState, ConnectionWaiter, FaultTolerantActuator,
    FaultTolerantSensor, SoilMoistureMonitor, TokioClock,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("soilsense_agent=info")),
        )
        .init();

    info!("SoilSense Agent starting...");

    let config = AgentConfig::load()
        .await
        .context("Failed to load agent configuration")?;

    let client = Arc::new(
        BackendClient::from_config(&config.backend).context("Failed to create backend client")?,
    );

    let mut connection = ConnectionState::new(&config.backend.host, config.backend.port);
    info!(
        "Waiting for backend at {} (retry policy: {})",
        client.base_url(),
        config.backend.retry_policy()
    );
    ConnectionWaiter::new(config.backend.retry_policy(), config.backend.retry_delay())
        .wait(client.as_ref(), &TokioClock, &mut connection)
        .await
        .context("Hardware backend unreachable, aborting startup")?;

    let sensor = FaultTolerantSensor::new(client.clone(), &connection, Some(config.device.sensor_channel))?;
    let relay = FaultTolerantActuator::new(client, &connection, config.device.relay_channel)?;

    let device_id = config.device.device_id.clone();
    let (mqtt_client, eventloop) = mqtt::connect(&config.mqtt, &device_id);
    let telemetry = mqtt::MqttTelemetry::new(mqtt_client.clone(), &device_id);

    let monitor = Arc::new(SoilMoistureMonitor::new(
        sensor,
        relay,
        telemetry,
        config.device.poll_interval(),
    ));

    let listener = mqtt::spawn_command_listener(eventloop, mqtt_client, monitor.clone(), device_id.clone());

    info!("Agent {} polling every {:?}", device_id, config.device.poll_interval());
    mqtt::run_with_listener(monitor.take_readings(&TokioClock, None), listener).await
}
