use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HubConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "soilsense-hub".into(),
            keep_alive_secs: 30,
        }
    }
}

/// Parse un hub.yaml; texte vide → config par défaut
pub fn parse_config(txt: &str) -> Result<HubConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(HubConfig::default());
    }
    serde_yaml::from_str(txt)
}

impl HubConfig {
    /// Surcharges SOILSENSE_MQTT_HOST / SOILSENSE_MQTT_PORT
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SOILSENSE_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("SOILSENSE_MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(e) => warn!("SOILSENSE_MQTT_PORT ignoré ({}): {}", port, e),
            }
        }
    }
}

pub const CONFIG_PATH_ENV: &str = "SOILSENSE_HUB_CONFIG";

pub async fn load_config() -> HubConfig {
    load_config_with(|key| std::env::var(key).ok()).await
}

/// Comme `load_config`, chemin et surcharges lus via `lookup`
pub async fn load_config_with<F>(lookup: F) -> HubConfig
where
    F: Fn(&str) -> Option<String>,
{
    let path = lookup(CONFIG_PATH_ENV).unwrap_or_else(|| "hub.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        match fs::read_to_string(&path).await {
            Ok(txt) => parse_config(&txt).unwrap_or_else(|e| {
                warn!("config invalide {}: {}", path, e);
                HubConfig::default()
            }),
            Err(e) => {
                warn!("lecture de {} impossible: {}, usage config par défaut", path, e);
                HubConfig::default()
            }
        }
    } else {
        warn!("pas de {}, usage config par défaut", path);
        HubConfig::default()
    };
    cfg.apply_env_overrides(&lookup);
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use soilsense_devkit::LogCapture;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.mqtt, MqttConf::default());
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.mqtt.port, 1883);
    }

    #[test]
    fn test_partial_yaml() {
        let cfg = parse_config("mqtt:\n  host: broker.lan\n").unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.mqtt.client_id, "soilsense-hub");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(parse_config("mqtt:\n  port: not-a-port\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("SOILSENSE_MQTT_HOST", "10.0.0.2"), ("SOILSENSE_MQTT_PORT", "8883")]);
        let mut cfg = HubConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.mqtt.host, "10.0.0.2");
        assert_eq!(cfg.mqtt.port, 8883);

        let mut cfg = HubConfig::default();
        cfg.apply_env_overrides(|k| (k == "SOILSENSE_MQTT_PORT").then(|| "nope".to_string()));
        assert_eq!(cfg.mqtt.port, 1883);
    }

    fn lookup_for(path: &std::path::Path) -> impl Fn(&str) -> Option<String> {
        let path = path.display().to_string();
        move |key| (key == CONFIG_PATH_ENV).then(|| path.clone())
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, "mqtt:\n  host: from-file\n  port: 1999\n").unwrap();

        let cfg = load_config_with(lookup_for(&path)).await;
        assert_eq!(cfg.mqtt.host, "from-file");
        assert_eq!(cfg.mqtt.port, 1999);
    }

    #[tokio::test]
    async fn test_load_applies_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, "mqtt:\n  host: from-file\n").unwrap();
        let file_lookup = lookup_for(&path);

        let cfg = load_config_with(|key| match key {
            "SOILSENSE_MQTT_HOST" => Some("from-env".to_string()),
            other => file_lookup(other),
        })
        .await;
        assert_eq!(cfg.mqtt.host, "from-env");
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let (logs, _guard) = LogCapture::install();
        let dir = tempfile::tempdir().unwrap();

        let cfg = load_config_with(lookup_for(&dir.path().join("absent.yaml"))).await;
        assert_eq!(cfg.mqtt, MqttConf::default());
        assert_eq!(logs.warnings(), 1);
    }

    #[tokio::test]
    async fn test_load_invalid_file_warns_and_uses_defaults() {
        let (logs, _guard) = LogCapture::install();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, "mqtt:\n  port: not-a-port\n").unwrap();

        let cfg = load_config_with(lookup_for(&path)).await;
        assert_eq!(cfg.mqtt, MqttConf::default());
        assert_eq!(logs.warnings(), 1);
    }

    #[tokio::test]
    async fn test_load_unreadable_file_warns_and_uses_defaults() {
        let (logs, _guard) = LogCapture::install();
        let dir = tempfile::tempdir().unwrap();
        // existe mais illisible comme texte
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let cfg = load_config_with(lookup_for(&path)).await;
        assert_eq!(cfg.mqtt, MqttConf::default());
        assert_eq!(logs.warnings(), 1);
    }
}
