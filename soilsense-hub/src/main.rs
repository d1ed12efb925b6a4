/**
 * SOILSENSE HUB - Point d'entrée du contrôleur d'irrigation
 *
 * RÔLE : Écoute la télémétrie de tous les devices via MQTT et renvoie
 * relay_on / relay_off selon le seuil d'humidité.
 *
 * ARCHITECTURE : Event-driven, un handler par message, aucun état partagé.
 */

use soilsense_hub::{load_config, mqtt, MqttCommandChannel, ThresholdController, MOISTURE_THRESHOLD};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("soilsense_hub=info")),
        )
        .init();

    let cfg = load_config().await;
    info!("SoilSense Hub starting (broker {}:{})", cfg.mqtt.host, cfg.mqtt.port);

    let (client, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt);
    let controller = Arc::new(ThresholdController::new(MqttCommandChannel::new(client.clone())));

    info!("threshold: relay_off above {}", MOISTURE_THRESHOLD);
    mqtt::run_listener(eventloop, client, controller).await;
}
