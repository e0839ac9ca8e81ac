//! Error types for the bridge

/// Result type alias
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Session-level errors. Every variant is recoverable: the supervisor logs
/// it, sleeps, and reconnects.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error (serial reads surface as these)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MQTT connection error from the event loop
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    /// MQTT client error (publish/subscribe request failed)
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    /// State payload could not be encoded
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sensor description file could not be parsed
    #[error("sensor description error: {0}")]
    SensorTable(#[from] serde_yaml::Error),

    /// Serial reader thread stopped without reporting an error
    #[error("serial line stream closed")]
    SerialClosed,

    /// MQTT event loop task stopped without reporting an error
    #[error("MQTT event loop stopped")]
    MqttLoopStopped,
}
