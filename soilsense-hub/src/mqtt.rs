use crate::config::MqttConf;
use crate::models::{DeviceMethod, MethodRequest, MethodResponseIn, TelemetryEvent};
use crate::threshold::{CommandChannel, DispatchError, ThresholdController};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEVICES_PREFIX: &str = "soilsense/devices/";
const TELEMETRY_SUFFIX: &str = "/telemetry@v1";
const RESPONSE_SUFFIX: &str = "/methods/response@v1";

pub const TELEMETRY_SUBSCRIPTION: &str = "soilsense/devices/+/telemetry@v1";
pub const RESPONSE_SUBSCRIPTION: &str = "soilsense/devices/+/methods/response@v1";

pub fn methods_topic(device_id: &str) -> String {
    format!("{}{}/methods@v1", DEVICES_PREFIX, device_id)
}

/// Extrait l'id device d'un topic "soilsense/devices/{id}{suffix}"
fn device_id_from_topic<'a>(topic: &'a str, suffix: &str) -> Option<&'a str> {
    let id = topic.strip_prefix(DEVICES_PREFIX)?.strip_suffix(suffix)?;
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

pub fn telemetry_device_id(topic: &str) -> Option<&str> {
    device_id_from_topic(topic, TELEMETRY_SUFFIX)
}

pub fn response_device_id(topic: &str) -> Option<&str> {
    device_id_from_topic(topic, RESPONSE_SUFFIX)
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    AsyncClient::new(opts, 10)
}

/// Canal de commandes via MQTT: publie un methods@v1 vers le device
#[derive(Clone)]
pub struct MqttCommandChannel {
    client: AsyncClient,
}

impl MqttCommandChannel {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl CommandChannel for MqttCommandChannel {
    async fn invoke_device_method(&self, device_id: &str, method: &DeviceMethod) -> Result<(), DispatchError> {
        let request = MethodRequest {
            request_id: Uuid::new_v4().to_string(),
            method_name: method.method_name.clone(),
            payload: method.payload.clone(),
            timestamp: OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)?,
        };
        let payload = serde_json::to_string(&request)?;

        // file de requêtes pleine (broker coupé) → échec immédiat, pas d'attente
        self.client
            .try_publish(methods_topic(device_id), QoS::AtLeastOnce, false, payload)
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        info!("sent {} ({}) to device {}", request.method_name, request.request_id, device_id);
        Ok(())
    }
}

/// Boucle MQTT du hub: télémétrie → contrôleur, réponses des devices → logs
pub async fn run_listener<C>(mut eventloop: EventLoop, client: AsyncClient, controller: Arc<ThresholdController<C>>)
where
    C: CommandChannel + 'static,
{
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                // re-abonnement à chaque (re)connexion
                for topic in [TELEMETRY_SUBSCRIPTION, RESPONSE_SUBSCRIPTION] {
                    match client.try_subscribe(topic, QoS::AtLeastOnce) {
                        Ok(()) => info!("subscribed to {}", topic),
                        Err(e) => error!("subscribe {} failed: {}", topic, e),
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                if let Some(device_id) = telemetry_device_id(&p.topic) {
                    let event = TelemetryEvent::new(device_id, p.payload.to_vec());
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        match controller.handle_event(&event).await {
                            Ok(Some(decision)) => {
                                debug!("device {} → {}", decision.device_id, decision.command)
                            }
                            Ok(None) => {}
                            Err(e) => error!("{}", e),
                        }
                    });
                } else if let Some(device_id) = response_device_id(&p.topic) {
                    log_method_response(device_id, &p.payload);
                } else {
                    debug!("ignoring message on {}", p.topic);
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT erreur: {:?}", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

fn log_method_response(device_id: &str, payload: &[u8]) {
    match serde_json::from_slice::<MethodResponseIn>(payload) {
        Ok(resp) if resp.status == 200 => {
            info!("device {} applied {} ", device_id, resp.request_id)
        }
        Ok(resp) => warn!(
            "device {} failed {} with status {}",
            device_id, resp.request_id, resp.status
        ),
        Err(e) => warn!("method response JSON invalide de {}: {}", device_id, e),
    }
}
