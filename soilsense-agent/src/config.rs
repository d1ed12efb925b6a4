//! Agent configuration
//!
//! Handles:
//! - Hardware backend location and startup retry policy
//! - MQTT broker settings
//! - Device identity, channel assignments and polling cadence
//!
//! Values come from a TOML file (`$SOILSENSE_AGENT_CONFIG`, default
//! `agent.toml`), then `SOILSENSE_*` environment variables override them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::connection::RetryPolicy;

pub const CONFIG_PATH_ENV: &str = "SOILSENSE_AGENT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub backend: BackendConfig,
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Absent means retry forever
    pub connect_attempts: Option<u32>,
    pub connect_retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: String,
    pub sensor_channel: u16,
    pub relay_channel: u16,
    pub poll_interval_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 5,
            connect_attempts: None,
            connect_retry_secs: 10,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 30,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "soil-sensor-01".to_string(),
            sensor_channel: 0,
            relay_channel: 5,
            poll_interval_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.connect_attempts {
            Some(max) => RetryPolicy::Bounded(max),
            None => RetryPolicy::Unbounded,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DeviceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl AgentConfig {
    /// Load config file (if any) and apply environment overrides
    pub async fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok()).await
    }

    /// Same as `load`, reading the config path and overrides from `lookup`
    pub async fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = Self::config_file_path(&lookup);

        let mut config = if path.exists() {
            Self::from_file(&path).await?
        } else {
            info!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides(&lookup)?;
        Ok(config)
    }

    pub fn config_file_path<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("agent.toml"))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `SOILSENSE_*` overrides from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SOILSENSE_BACKEND_HOST") {
            self.backend.host = host;
        }
        if let Some(port) = lookup("SOILSENSE_BACKEND_PORT") {
            self.backend.port = port
                .parse()
                .with_context(|| format!("Invalid SOILSENSE_BACKEND_PORT: {}", port))?;
        }
        if let Some(attempts) = lookup("SOILSENSE_CONNECT_ATTEMPTS") {
            self.backend.connect_attempts = match attempts.parse::<RetryPolicy>()? {
                RetryPolicy::Unbounded => None,
                RetryPolicy::Bounded(max) => Some(max),
            };
        }
        if let Some(host) = lookup("SOILSENSE_MQTT_HOST") {
            self.mqtt.broker_host = host;
        }
        if let Some(port) = lookup("SOILSENSE_MQTT_PORT") {
            self.mqtt.broker_port = port
                .parse()
                .with_context(|| format!("Invalid SOILSENSE_MQTT_PORT: {}", port))?;
        }
        if let Some(device_id) = lookup("SOILSENSE_DEVICE_ID") {
            self.device.device_id = device_id;
        }
        Ok(())
    }
}
