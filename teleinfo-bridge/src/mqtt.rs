//! MQTT session
//!
//! Wraps a `rumqttc::AsyncClient` plus the tokio task driving its event
//! loop. The task owns everything broker-initiated: it subscribes to the
//! broker status topic after each ConnAck, triggers the discovery publisher
//! on connection and on a broker `online` announcement, and reports the
//! first connection error to the pipeline, then stops. Snapshot state never
//! crosses into this task.

use crate::config::Config;
use crate::discovery::{DiscoveryPublisher, SensorTable};
use crate::error::BridgeError;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Live MQTT session. Dropping it tears the event-loop task down via the
/// shutdown guard.
pub struct MqttSession {
    pub client: AsyncClient,
    /// Delivers the fatal connection error, if one occurs.
    pub errors: mpsc::Receiver<BridgeError>,
    _shutdown: oneshot::Sender<()>,
}

/// Build the client and spawn its event-loop task. Connection establishment
/// is lazy: a refused broker surfaces on the error channel.
pub fn connect(config: &Config, table: Arc<SensorTable>) -> MqttSession {
    let mqtt = &config.mqtt;
    let mut options = MqttOptions::new(&mqtt.client_id, &mqtt.host, mqtt.port);
    options.set_keep_alive(KEEP_ALIVE);
    if let (Some(username), Some(password)) = (&mqtt.username, &mqtt.password) {
        options.set_credentials(username, password);
    }

    let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
    let discovery = DiscoveryPublisher::new(client.clone(), table, mqtt);

    let (err_tx, err_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(drive_event_loop(
        eventloop,
        client.clone(),
        discovery,
        mqtt.status_topic(),
        err_tx,
        shutdown_rx,
    ));

    MqttSession {
        client,
        errors: err_rx,
        _shutdown: shutdown_tx,
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    discovery: DiscoveryPublisher,
    status_topic: String,
    err_tx: mpsc::Sender<BridgeError>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    if let Err(e) = client.try_subscribe(&status_topic, QoS::AtMostOnce) {
                        warn!(error = %e, topic = %status_topic, "status subscribe failed");
                    }
                    spawn_discovery(&discovery);
                }
                Ok(Event::Incoming(Incoming::Publish(publish)))
                    if publish.topic == status_topic =>
                {
                    if publish.payload.as_ref() == "online".as_bytes() {
                        info!("broker back online, refreshing discovery");
                        spawn_discovery(&discovery);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = err_tx.send(e.into()).await;
                    return;
                }
            }
        }
    }
}

/// Discovery publishes go through the request channel the loop itself
/// drains, so they run on their own task to keep the loop polling.
fn spawn_discovery(discovery: &DiscoveryPublisher) {
    let discovery = discovery.clone();
    tokio::spawn(async move {
        if let Err(e) = discovery.publish_all().await {
            warn!(error = %e, "discovery publish failed");
        }
    });
}
