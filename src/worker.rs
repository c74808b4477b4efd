use std::thread;
use std::time::Duration;
use chrono::Utc;
use log::{error, info, warn};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use crate::config::Bridge;
use crate::errors::BridgeError;
use crate::manager_model_client::Predictor;
use crate::models::prediction::SensorReading;
use crate::models::telemetry::{ResponsePayload, TelemetryPayload};

/// Device id used when the telemetry topic does not carry one
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Sink for outbound messages
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError>;
}

pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        self.client.publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }
}

/// Returns the device id from a `sensor/{device_id}/data` topic, or "unknown" when the
/// topic has fewer than three segments
///
/// # Arguments
///
/// * 'topic' - the topic a telemetry message arrived on
pub fn device_id_from_topic(topic: &str) -> String {
    let parts = topic.split('/').collect::<Vec<&str>>();
    if parts.len() >= 3 {
        parts[1].to_string()
    } else {
        UNKNOWN_DEVICE.to_string()
    }
}

/// Returns the topic a device listens on for responses
///
/// # Arguments
///
/// * 'device_id' - id of the device
pub fn response_topic(device_id: &str) -> String {
    format!("device/{}/response", device_id)
}

/// Turns telemetry messages into predictions and predictions into device responses,
/// one message at a time
pub struct Dispatcher<P, Q> {
    predictor: P,
    publisher: Q,
}

impl<P: Predictor, Q: Publisher> Dispatcher<P, Q> {
    pub fn new(predictor: P, publisher: Q) -> Self {
        Self { predictor, publisher }
    }

    pub fn into_parts(self) -> (P, Q) {
        (self.predictor, self.publisher)
    }

    /// Handles one inbound message. Any failure is logged and the message is dropped.
    ///
    /// Returns true if a response was published.
    ///
    /// # Arguments
    ///
    /// * 'topic' - topic the message arrived on
    /// * 'payload' - raw message payload
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> bool {
        match self.handle(topic, payload) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to process message on {}: {}", topic, e);
                false
            }
        }
    }

    fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        info!("received on {}: {}", topic, String::from_utf8_lossy(payload));

        let device_id = device_id_from_topic(topic);
        let telemetry = TelemetryPayload::parse(payload)?;

        // Stamped on receipt, a timestamp in the payload is not used
        let reading = SensorReading {
            device_id,
            irradiation: telemetry.irradiation,
            module_temperature: telemetry.module_temperature,
            ambient_temperature: telemetry.ambient_temperature,
            timestamp: Utc::now().timestamp(),
        };

        let response = self.predictor.predict(&reading)?;
        info!("prediction for {}: status {}", reading.device_id, response.status());

        let received_at = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let out = ResponsePayload::new(&reading.device_id, &response, received_at);
        let json = serde_json::to_string(&out)?;

        let topic = response_topic(&reading.device_id);
        self.publisher.publish(&topic, json.clone().into_bytes())?;
        info!("sent to {}: {}", topic, json);

        Ok(())
    }
}

/// Runs the ingestion bridge: subscribes to the telemetry topic and handles messages in
/// receipt order until the broker connection is closed for good.
///
/// The subscription is renewed on every (re)connect, broker errors are logged and the loop
/// waits `wait_seconds` before polling again.
///
/// # Arguments
///
/// * 'config' - bridge configuration
/// * 'predictor' - connected prediction client
pub fn run<P: Predictor>(config: &Bridge, predictor: P) -> Result<(), BridgeError> {
    let mut options = MqttOptions::new(&config.client_id, &config.mqtt_host, config.mqtt_port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    let (client, mut connection) = Client::new(options, 10);
    let mut dispatcher = Dispatcher::new(predictor, MqttPublisher::new(client.clone()));

    info!("connecting to broker {}:{}", config.mqtt_host, config.mqtt_port);
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("connected to broker with code {:?}", ack.code);
                match client.subscribe(&config.telemetry_topic, QoS::AtMostOnce) {
                    Ok(()) => info!("subscribed to {}", config.telemetry_topic),
                    Err(e) => error!("subscribe to {} failed: {}", config.telemetry_topic, e),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatcher.dispatch(&publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("broker connection error: {}", e);
                thread::sleep(config.wait());
            }
        }
    }

    Ok(())
}
