//! Home Assistant MQTT discovery
//!
//! The sensor description file provides device metadata and one entity
//! entry per meter field. Each entity is enriched with the shared state
//! topic and a value template extracting its field from the state payload,
//! then published to its own discovery config topic.

use crate::config::MqttConfig;
use crate::error::Result;
use rumqttc::{AsyncClient, QoS};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Sensor description file: `device` metadata plus field key -> entity
/// metadata, passed through to the discovery payloads verbatim.
#[derive(Debug, Deserialize)]
pub struct SensorTable {
    pub device: Value,
    pub entities: HashMap<String, Map<String, Value>>,
}

impl SensorTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Publishes one discovery config per described sensor. Cheap to clone;
/// the MQTT event-loop task re-runs it whenever the broker (re)appears.
#[derive(Clone)]
pub struct DiscoveryPublisher {
    client: AsyncClient,
    table: Arc<SensorTable>,
    discovery_topic: String,
    state_topic: String,
}

impl DiscoveryPublisher {
    pub fn new(client: AsyncClient, table: Arc<SensorTable>, mqtt: &MqttConfig) -> Self {
        Self {
            client,
            table,
            discovery_topic: mqtt.discovery_topic.clone(),
            state_topic: mqtt.state_topic.clone(),
        }
    }

    /// Announce every described sensor to the broker.
    pub async fn publish_all(&self) -> Result<()> {
        for (key, entity) in &self.table.entities {
            let payload = serde_json::to_string(&self.config_payload(key, entity))?;
            self.client
                .publish(self.config_topic(key), QoS::AtLeastOnce, false, payload)
                .await?;
            debug!(key, "published discovery config");
        }
        info!(sensors = self.table.entities.len(), "discovery published");
        Ok(())
    }

    fn config_topic(&self, key: &str) -> String {
        format!(
            "{}/sensor/teleinfo/{}/config",
            self.discovery_topic,
            key.to_lowercase()
        )
    }

    /// Entity metadata enriched with the device info and the wiring into
    /// the shared state topic.
    fn config_payload(&self, key: &str, entity: &Map<String, Value>) -> Map<String, Value> {
        let mut payload = entity.clone();
        payload.insert("device".into(), self.table.device.clone());
        payload.insert("enabled_by_default".into(), json!(true));
        payload.insert("name".into(), json!(format!("Teleinfo {key}")));
        payload.insert("state_topic".into(), json!(self.state_topic));
        payload.insert(
            "unique_id".into(),
            json!(format!("teleinfo_{}", key.to_lowercase())),
        );
        payload.insert(
            "value_template".into(),
            json!(format!("{{{{ value_json.{} }}}}", key.to_uppercase())),
        );
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
device:
  identifiers: [teleinfo]
  name: Linky
  manufacturer: Enedis
entities:
  HCHC:
    device_class: energy
    unit_of_measurement: Wh
    state_class: total_increasing
  PTEC:
    icon: mdi:clock-outline
"#;

    fn publisher() -> DiscoveryPublisher {
        let table: SensorTable = serde_yaml::from_str(SAMPLE).unwrap();
        let mqtt = MqttConfig {
            host: "localhost".into(),
            port: 1883,
            client_id: "teleinfo".into(),
            username: None,
            password: None,
            discovery_topic: "homeassistant".into(),
            state_topic: "teleinfo".into(),
        };
        let options = rumqttc::MqttOptions::new("test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 10);
        DiscoveryPublisher::new(client, Arc::new(table), &mqtt)
    }

    #[test]
    fn table_parses_device_and_entities() {
        let table: SensorTable = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(table.entities.len(), 2);
        assert_eq!(table.device["name"], json!("Linky"));
        assert_eq!(
            table.entities["HCHC"]["unit_of_measurement"],
            json!("Wh")
        );
    }

    #[tokio::test]
    async fn config_topic_lowercases_the_key() {
        let publisher = publisher();
        assert_eq!(
            publisher.config_topic("HCHC"),
            "homeassistant/sensor/teleinfo/hchc/config"
        );
    }

    #[tokio::test]
    async fn payload_is_enriched_with_wiring_fields() {
        let publisher = publisher();
        let entity = publisher.table.entities["HCHC"].clone();
        let payload = publisher.config_payload("HCHC", &entity);

        assert_eq!(payload["name"], json!("Teleinfo HCHC"));
        assert_eq!(payload["unique_id"], json!("teleinfo_hchc"));
        assert_eq!(payload["state_topic"], json!("teleinfo"));
        assert_eq!(payload["value_template"], json!("{{ value_json.HCHC }}"));
        assert_eq!(payload["enabled_by_default"], json!(true));
        assert_eq!(payload["device"]["manufacturer"], json!("Enedis"));
        // Entity metadata from the file passes through untouched
        assert_eq!(payload["device_class"], json!("energy"));
        assert_eq!(payload["state_class"], json!("total_increasing"));
    }
}
