//! Teleinfo bridge - utility meter serial stream to MQTT
//!
//! Reads the meter's framed key/value telemetry from a serial port,
//! validates each group's checksum, aggregates fields into snapshots and
//! publishes them to an MQTT state topic at a bounded rate. Sensors are
//! announced through Home Assistant MQTT discovery on every (re)connection
//! and whenever the broker reports itself back online.

mod config;
mod discovery;
mod error;
mod frame;
mod gate;
mod mqtt;
mod serial;
mod session;

use anyhow::{Context, Result};
use config::Config;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;

    let level = if config.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!(
        port = %config.serial_port,
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        interval_secs = config.publish_interval.as_secs_f64(),
        "starting teleinfo bridge"
    );

    // Runs forever; every failure is handled inside.
    session::supervise(config).await;

    Ok(())
}
