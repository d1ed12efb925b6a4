/**
 * THRESHOLD CONTROLLER - Décision d'irrigation à partir de la télémétrie
 *
 * RÔLE : Pour chaque lecture d'humidité reçue, choisir relay_on / relay_off
 * et l'envoyer au device via le canal de commandes.
 *
 * FONCTIONNEMENT :
 * - Lecture > 500 → relay_off (sol assez humide), sinon relay_on
 * - Payload sans `soil_moisture` → aucun dispatch, pas d'erreur
 * - Échec de dispatch → remonté à l'appelant, jamais retenté ici
 *
 * Aucun état conservé entre deux événements: des invocations concurrentes
 * pour des devices différents sont sûres.
 */

use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

use crate::models::{DeviceMethod, TelemetryEvent};

pub const MOISTURE_THRESHOLD: i64 = 500;

/// Payload par convention de toutes les commandes relais
pub const EMPTY_PAYLOAD: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    RelayOn,
    RelayOff,
}

impl RelayCommand {
    pub fn method_name(&self) -> &'static str {
        match self {
            RelayCommand::RelayOn => "relay_on",
            RelayCommand::RelayOff => "relay_off",
        }
    }
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdDecision {
    pub device_id: String,
    pub command: RelayCommand,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode method request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("command transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed telemetry from {device_id}: {source}")]
    Decode {
        device_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to dispatch {command} to {device_id}: {source}")]
    Dispatch {
        device_id: String,
        command: RelayCommand,
        #[source]
        source: DispatchError,
    },
}

/// Canal cloud → device pour les invocations de méthodes
pub trait CommandChannel: Send + Sync {
    fn invoke_device_method(
        &self,
        device_id: &str,
        method: &DeviceMethod,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

pub struct ThresholdController<C> {
    channel: C,
}

impl<C: CommandChannel> ThresholdController<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Fonction pure et totale sur les entiers
    pub fn decide(&self, device_id: &str, reading_value: i64) -> ThresholdDecision {
        let command = if reading_value > MOISTURE_THRESHOLD {
            RelayCommand::RelayOff
        } else {
            RelayCommand::RelayOn
        };

        ThresholdDecision {
            device_id: device_id.to_string(),
            command,
        }
    }

    pub async fn dispatch(&self, device_id: &str, command: RelayCommand) -> Result<(), DispatchError> {
        let method = DeviceMethod {
            method_name: command.method_name().to_string(),
            payload: EMPTY_PAYLOAD.to_string(),
        };
        self.channel.invoke_device_method(device_id, &method).await
    }

    /// Traite un événement de télémétrie.
    ///
    /// Retourne la décision appliquée, ou `None` si le payload ne contient
    /// aucune lecture exploitable.
    pub async fn handle_event(&self, event: &TelemetryEvent) -> Result<Option<ThresholdDecision>, HandlerError> {
        let reading = event.soil_moisture().map_err(|source| HandlerError::Decode {
            device_id: event.device_id.clone(),
            source,
        })?;

        let Some(value) = reading else {
            debug!("no soil_moisture in telemetry from {}, skipping", event.device_id);
            return Ok(None);
        };

        let decision = self.decide(&event.device_id, value);
        self.dispatch(&decision.device_id, decision.command)
            .await
            .map_err(|source| HandlerError::Dispatch {
                device_id: decision.device_id.clone(),
                command: decision.command,
                source,
            })?;

        Ok(Some(decision))
    }
}

#[cfg(test)]
impl CommandChannel for soilsense_devkit::MockMqttClient {
    async fn invoke_device_method(&self, device_id: &str, method: &DeviceMethod) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(method)?;
        self.publish(crate::mqtt::methods_topic(device_id), rumqttc::QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}
