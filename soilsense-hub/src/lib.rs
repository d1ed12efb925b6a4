pub mod config;
pub mod models;
pub mod mqtt;
pub mod threshold;

pub use config::{load_config, HubConfig, MqttConf};
pub use models::{DeviceMethod, TelemetryEvent};
pub use mqtt::MqttCommandChannel;
pub use threshold::{
    CommandChannel, DispatchError, HandlerError, RelayCommand, ThresholdController, ThresholdDecision,
    MOISTURE_THRESHOLD,
};
