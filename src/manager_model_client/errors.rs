use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("prediction service unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
    #[error("connection attempt failed: {0}")]
    Connect(String),
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("rpc status {code:?}: {message}")]
    Status { code: tonic::Code, message: String },
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
impl From<tonic::Status> for ClientError {
    fn from(s: tonic::Status) -> Self {
        ClientError::Status { code: s.code(), message: s.message().to_string() }
    }
}
impl From<tonic::transport::Error> for ClientError {
    fn from(e: tonic::transport::Error) -> Self { ClientError::Connect(e.to_string()) }
}
