/*!
# SoilSense DevKit - Doubles de test partagés

Bibliothèque utilisée en dev-dependency par l'agent et le hub:
- Mock MQTT pour tests sans broker
- Horloge enregistreuse pour les boucles de retry et de polling
- Capture des logs tracing pour vérifier le comportement fail-soft
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use test_utils::{closing_local_port, unused_local_port, LogCapture, RecordingClock};
