//! SoilSense Agent - soil moisture device agent
//!
//! Bridges a sensor/relay hardware backend (real board or simulator) to the
//! SoilSense hub:
//! - Waits for the backend at startup with a bounded or unbounded retry policy
//! - Reads soil moisture without failing on connectivity loss
//! - Publishes telemetry and applies remote relay commands via MQTT

pub mod actuator;
pub mod backend;
pub mod clock;
pub mod config;
pub mod connection;
pub mod messages;
pub mod monitor;
pub mod mqtt;
pub mod sensor;

pub use actuator::{ActuatorCommand, ActuatorResult, FaultTolerantActuator, Relay};
pub use backend::{BackendClient, BackendError};
pub use clock::{Clock, TokioClock};
pub use config::AgentConfig;
pub use connection::{ConnectError, ConnectionState, ConnectionWaiter, Probe, RetryPolicy};
pub use monitor::{MonitorError, PublishError, SoilMoistureMonitor, TelemetrySink};
pub use sensor::{AnalogInput, FaultTolerantSensor, SensorReading};
