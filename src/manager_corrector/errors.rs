use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrectorError {
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("malformed input row: {0}")]
    Shape(String),
    #[error("input schema mismatch: expected columns {expected:?}, got {got:?}")]
    Schema { expected: Vec<String>, got: Vec<String> },
}
impl From<serde_json::Error> for CorrectorError {
    fn from(e: serde_json::Error) -> Self { CorrectorError::Artifact(format!("json document error: {}", e)) }
}
