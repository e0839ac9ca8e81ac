//! Session supervision
//!
//! One session = one sensor table load, one MQTT client, one open serial
//! port, one streaming pipeline. Any serial or MQTT failure ends the
//! session; the supervisor logs it, waits a fixed backoff and starts over,
//! forever. The pipeline task is the only owner of the accumulator and the
//! publish gate.

use crate::config::Config;
use crate::discovery::SensorTable;
use crate::error::{BridgeError, Result};
use crate::frame::{FrameAccumulator, Snapshot};
use crate::gate::PublishGate;
use crate::{mqtt, serial};
use rumqttc::QoS;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Fixed pause between reconnect attempts. Deliberately constant: the
/// bridge runs unattended and just keeps trying.
const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Run sessions forever, absorbing every failure.
pub async fn supervise(config: Config) {
    loop {
        if let Err(e) = run_session(&config).await {
            error!(error = %e, "session failed");
        }
        info!(seconds = RETRY_BACKOFF.as_secs(), "reconnecting after backoff");
        sleep(RETRY_BACKOFF).await;
    }
}

/// Connect both sides and stream until something breaks. Returning drops
/// the serial link (stopping the reader thread) and the MQTT session
/// (stopping its event-loop task).
async fn run_session(config: &Config) -> Result<()> {
    let table = Arc::new(SensorTable::load(&config.sensors_file)?);
    let mut mqtt = mqtt::connect(config, table);
    let mut serial = serial::open(&config.serial_port)?;
    info!(port = %config.serial_port, "streaming meter frames");

    let mut ctx = SessionContext::new(config.publish_interval);
    loop {
        tokio::select! {
            line = serial.lines.recv() => match line {
                Some(Ok(line)) => {
                    debug!(line = %line, "serial line");
                    if let Some(snapshot) = ctx.ingest(&line, Instant::now()) {
                        let payload = serde_json::to_string(&snapshot)?;
                        mqtt.client
                            .publish(&config.mqtt.state_topic, QoS::AtLeastOnce, false, payload)
                            .await?;
                        info!(
                            fields = snapshot.len(),
                            topic = %config.mqtt.state_topic,
                            "snapshot published"
                        );
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(BridgeError::SerialClosed),
            },
            err = mqtt.errors.recv() => {
                return Err(err.unwrap_or(BridgeError::MqttLoopStopped));
            }
        }
    }
}

/// Per-session parsing and publish-cadence state.
struct SessionContext {
    accumulator: FrameAccumulator,
    gate: PublishGate,
}

impl SessionContext {
    fn new(publish_interval: Duration) -> Self {
        Self {
            accumulator: FrameAccumulator::new(),
            gate: PublishGate::new(publish_interval),
        }
    }

    /// Feed one serial line through the validator and accumulator; at a
    /// frame end, ask the gate whether the snapshot is due. The returned
    /// snapshot has already been taken out of the accumulator.
    fn ingest(&mut self, line: &str, now: Instant) -> Option<Snapshot> {
        if !self.accumulator.apply_line(line) {
            return None;
        }
        self.gate.try_flush(&mut self.accumulator, now)
    }
}
