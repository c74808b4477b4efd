use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("scaler error: {0}")]
    Scaler(String),
    #[error("input dimension mismatch: expected {expected} features, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("malformed input row: {0}")]
    Shape(String),
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),
}
impl From<serde_json::Error> for ForecastError {
    fn from(e: serde_json::Error) -> Self { ForecastError::Artifact(format!("json document error: {}", e)) }
}
