use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Télémétrie brute reçue d'un device; l'id vient du topic MQTT
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub device_id: String,
    pub body: Vec<u8>,
}

impl TelemetryEvent {
    pub fn new(device_id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            device_id: device_id.into(),
            body: body.into(),
        }
    }

    /// Extrait `soil_moisture` du payload.
    ///
    /// Champ absent ou `null` → `Ok(None)`. Payload non-objet ou valeur non
    /// entière → erreur de décodage.
    pub fn soil_moisture(&self) -> Result<Option<i64>, serde_json::Error> {
        let fields: serde_json::Map<String, Value> = serde_json::from_slice(&self.body)?;
        match fields.get("soil_moisture") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }
}

/// Invocation nommée vers un device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMethod {
    pub method_name: String,
    pub payload: String,
}

/// Message methods@v1 publié vers le device
#[derive(Debug, Serialize)]
pub struct MethodRequest {
    pub request_id: String,
    pub method_name: String,
    pub payload: String,
    pub timestamp: String,
}

/// Réponse methods/response@v1 du device
#[derive(Debug, Deserialize)]
pub struct MethodResponseIn {
    pub request_id: String,
    pub status: u16,
    pub timestamp: Option<String>,
}
