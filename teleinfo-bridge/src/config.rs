//! Environment-based configuration
//!
//! The bridge is configured entirely through environment variables
//! (a `.env` file is honored). `MQTT_HOST` is the only required value;
//! everything else has a working default.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_PUBLISH_INTERVAL: &str = "30";
const DEFAULT_SENSORS_FILE: &str = "teleinfo.yml";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "teleinfo";
const DEFAULT_DISCOVERY_TOPIC: &str = "homeassistant";
const DEFAULT_STATE_TOPIC: &str = "teleinfo";

#[derive(Debug, Clone)]
pub struct Config {
    /// Serial device path (`TELEINFO_PORT`)
    pub serial_port: String,
    /// Echo every raw received line (`TELEINFO_DEBUG=1`)
    pub debug: bool,
    /// Minimum delay between two state publishes (`TELEINFO_PUBLISH_INTERVAL`)
    pub publish_interval: Duration,
    /// Sensor description YAML path (`TELEINFO_SENSORS`)
    pub sensors_file: String,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix of the discovery topics, also carries the broker status topic
    pub discovery_topic: String,
    /// Topic receiving the aggregated state JSON object
    pub state_topic: String,
}

impl MqttConfig {
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.discovery_topic)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let interval = env_or("TELEINFO_PUBLISH_INTERVAL", DEFAULT_PUBLISH_INTERVAL);
        let publish_interval = parse_interval(&interval)
            .with_context(|| format!("invalid TELEINFO_PUBLISH_INTERVAL: {interval:?}"))?;

        let port = match env::var("MQTT_PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid MQTT_PORT: {raw:?}"))?,
            Err(_) => DEFAULT_MQTT_PORT,
        };

        Ok(Config {
            serial_port: env_or("TELEINFO_PORT", DEFAULT_SERIAL_PORT),
            debug: env::var("TELEINFO_DEBUG").is_ok_and(|v| v == "1"),
            publish_interval,
            sensors_file: env_or("TELEINFO_SENSORS", DEFAULT_SENSORS_FILE),
            mqtt: MqttConfig {
                host: env::var("MQTT_HOST").context("MQTT_HOST is not set")?,
                port,
                client_id: env_or("MQTT_CLIENT_ID", DEFAULT_CLIENT_ID),
                username: env::var("MQTT_USERNAME").ok(),
                password: env::var("MQTT_PASSWORD").ok(),
                discovery_topic: env_or("MQTT_DISCOVERY_TOPIC", DEFAULT_DISCOVERY_TOPIC),
                state_topic: env_or("MQTT_STATE_TOPIC", DEFAULT_STATE_TOPIC),
            },
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Publish interval is a float number of seconds; it must be finite and
/// non-negative so it can become a `Duration`.
fn parse_interval(raw: &str) -> Result<Duration> {
    let secs: f64 = raw.parse().context("not a number")?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("must be a finite, non-negative number of seconds");
    }
    Ok(Duration::from_secs_f64(secs))
}
