use std::fmt;
use std::fmt::Formatter;
use thiserror::Error;
use crate::manager_corrector::errors::CorrectorError;
use crate::manager_forecaster::errors::ForecastError;
use crate::manager_model_client::errors::ClientError;

#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}
impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self { ConfigError(e.to_string()) }
}
impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self { ConfigError(e.to_string()) }
}
impl From<log::SetLoggerError> for ConfigError {
    fn from(e: log::SetLoggerError) -> Self { ConfigError(format!("logger: {}", e)) }
}
impl From<log4rs::config::runtime::ConfigErrors> for ConfigError {
    fn from(e: log4rs::config::runtime::ConfigErrors) -> Self { ConfigError(format!("logger: {}", e)) }
}

/// Failure to bring either model into memory, always fatal
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("forecaster: {0}")]
    Forecaster(#[from] ForecastError),
    #[error("corrector: {0}")]
    Corrector(#[from] CorrectorError),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("reflection setup error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while bridging a single telemetry message, the message is dropped when one occurs
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("prediction call failed: {0}")]
    Rpc(#[from] ClientError),
    #[error("publish failed: {0}")]
    Publish(String),
}
impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self { BridgeError::Payload(e.to_string()) }
}
impl From<rumqttc::ClientError> for BridgeError {
    fn from(e: rumqttc::ClientError) -> Self { BridgeError::Publish(e.to_string()) }
}
