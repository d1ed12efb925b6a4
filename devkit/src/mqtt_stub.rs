/*!
Mock MQTT Client pour tests sans broker

Enregistre tous les messages publiés par l'agent ou le hub et permet de
simuler une panne de transport pour vérifier la propagation des erreurs.
*/

use anyhow::Result;
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    offline: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bascule le client en mode "broker injoignable": chaque publish échoue
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let topic = topic.into();
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("mock broker offline, cannot publish to {}", topic);
        }

        let message = MockMessage {
            topic,
            payload: payload.into(),
            qos,
            retain,
        };

        tracing::debug!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_publish() {
        let client = MockMqttClient::new();

        let payload = b"test message";
        client.publish("test/topic", QoS::AtLeastOnce, false, payload.to_vec()).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "test/topic");
        assert_eq!(messages[0].payload, payload);
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();

        let payload = serde_json::to_vec(&serde_json::json!({ "soil_moisture": 42 })).unwrap();
        client.publish("json/topic", QoS::AtLeastOnce, false, payload).await.unwrap();

        let parsed: Option<serde_json::Value> = client.get_last_json_message("json/topic").unwrap();
        assert_eq!(parsed.unwrap()["soil_moisture"], 42);

        let missing: Option<serde_json::Value> = client.get_last_json_message("other/topic").unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_offline_client_rejects_publish() {
        let client = MockMqttClient::new();
        client.set_offline(true);

        assert!(client.publish("t", QoS::AtLeastOnce, false, b"x".to_vec()).await.is_err());
        assert!(client.get_published_messages().is_empty());

        client.set_offline(false);
        client.publish("t", QoS::AtLeastOnce, false, b"x".to_vec()).await.unwrap();
        assert_eq!(client.find_messages_by_topic("t").len(), 1);
    }
}
