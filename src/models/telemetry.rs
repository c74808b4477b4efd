use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use crate::models::prediction::PredictionResponse;

/// Telemetry as published by a device on `sensor/{device_id}/data`.
///
/// Missing fields default to 0.0, a numeric string is accepted as a number and a boolean as 1.0 or 0.0.
#[derive(Deserialize, Debug, PartialEq)]
pub struct TelemetryPayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub irradiation: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub module_temperature: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ambient_temperature: f64,
}

impl TelemetryPayload {
    /// Parses a raw payload, only a JSON object is accepted
    ///
    /// # Arguments
    ///
    /// * 'payload' - raw bytes as received from the broker
    pub fn parse(payload: &[u8]) -> Result<TelemetryPayload, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!("expected a JSON object, got {}", kind_of(&value))));
        }

        serde_json::from_value(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Accepts a JSON number, a string holding a number or a boolean
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64()
            .ok_or_else(|| serde::de::Error::custom(format!("number out of range: {}", n))),
        Value::String(s) => s.trim().parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {:?}", s))),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        other => Err(serde::de::Error::custom(format!("expected a number, got {}", kind_of(&other)))),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScorePayload {
    #[serde(rename = "IRRADIATION")]
    pub irradiation: f64,
    #[serde(rename = "MODULE_TEMPERATURE")]
    pub module_temperature: f64,
    #[serde(rename = "AMBIENT_TEMPERATURE")]
    pub ambient_temperature: f64,
}

/// Payload published back to a device on `device/{device_id}/response`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponsePayload {
    pub device_id: String,
    pub status: String,
    pub score: ScorePayload,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_detail: Option<String>,
    pub received_at: f64,
}

impl ResponsePayload {
    /// Builds the device response from a prediction
    ///
    /// # Arguments
    ///
    /// * 'device_id' - device the response is addressed to
    /// * 'response' - the prediction outcome
    /// * 'received_at' - unix time in seconds when the prediction was received
    pub fn new(device_id: &str, response: &PredictionResponse, received_at: f64) -> Self {
        let (score, final_score, error_detail) = match response {
            PredictionResponse::Ok { forecast, final_score } => (
                ScorePayload {
                    irradiation: forecast.get_or_zero(0),
                    module_temperature: forecast.get_or_zero(1),
                    ambient_temperature: forecast.get_or_zero(2),
                },
                Some(*final_score),
                None,
            ),
            PredictionResponse::Error { error_detail } => (
                ScorePayload { irradiation: 0.0, module_temperature: 0.0, ambient_temperature: 0.0 },
                None,
                Some(error_detail.clone()),
            ),
        };

        Self {
            device_id: device_id.to_string(),
            status: response.status().to_string(),
            score,
            final_score,
            error_detail,
            received_at,
        }
    }
}
