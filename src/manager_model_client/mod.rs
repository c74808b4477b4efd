pub mod errors;

use std::fmt::Display;
use std::thread;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::runtime::Runtime;
use tonic::transport::{Channel, Endpoint};
use crate::config::Bridge;
use crate::manager_model_client::errors::ClientError;
use crate::models::prediction::{ForecastVector, PredictionResponse, PredictionStatus, SensorReading};
use crate::proto::model_service_client::ModelServiceClient;
use crate::proto::{AiResponse, SensorRequest};

/// Anything able to answer a prediction request synchronously
pub trait Predictor {
    fn predict(&mut self, reading: &SensorReading) -> Result<PredictionResponse, ClientError>;
}

/// Connection state towards the prediction service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
}

/// Bounds the startup wait for the prediction service
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: Duration,
    pub connect_timeout: Duration,
}

impl From<&Bridge> for RetryPolicy {
    fn from(config: &Bridge) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            wait: config.wait(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Tries to connect at most `max_retries` times, sleeping `wait` between failed attempts.
///
/// # Arguments
///
/// * 'policy' - the retry budget
/// * 'attempt' - performs one connection attempt, given the attempt number starting at 1
/// * 'sleep' - called with the wait duration between attempts
pub fn connect_with_retry<T, E, A, S>(policy: &RetryPolicy, mut attempt: A, mut sleep: S) -> Result<T, ClientError>
where
    E: Display,
    A: FnMut(u32) -> Result<T, E>,
    S: FnMut(Duration),
{
    let mut state = ConnectionState::Disconnected;

    for n in 1..=policy.max_retries {
        state = transition(state, ConnectionState::Connecting { attempt: n });

        match attempt(n) {
            Ok(connection) => {
                transition(state, ConnectionState::Connected);
                info!("connected to prediction service");
                return Ok(connection);
            }
            Err(e) => {
                state = transition(state, ConnectionState::Disconnected);
                warn!("retry {}/{} - waiting for prediction service... ({})", n, policy.max_retries, e);
                if n < policy.max_retries {
                    sleep(policy.wait);
                }
            }
        }
    }

    Err(ClientError::Unreachable { attempts: policy.max_retries })
}

fn transition(from: ConnectionState, to: ConnectionState) -> ConnectionState {
    debug!("connection state {:?} -> {:?}", from, to);
    to
}

/// Blocking client for the prediction service.
///
/// Owns a private single threaded runtime so it can be driven from the bridge's blocking loop.
pub struct RpcClient {
    runtime: Runtime,
    client: ModelServiceClient<Channel>,
    call_timeout: Duration,
}

impl RpcClient {
    /// Connects to the prediction service within the configured retry budget
    ///
    /// # Arguments
    ///
    /// * 'config' - bridge configuration holding endpoint, timeouts and retry budget
    pub fn connect(config: &Bridge) -> Result<RpcClient, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let endpoint = Endpoint::from_shared(config.rpc_endpoint.clone())
            .map_err(|e| ClientError::Endpoint(format!("{}: {}", config.rpc_endpoint, e)))?
            .connect_timeout(config.connect_timeout());

        let policy = RetryPolicy::from(config);
        info!("connecting to prediction service at {}", config.rpc_endpoint);
        let channel = connect_with_retry(
            &policy,
            |_| runtime.block_on(open_channel(&endpoint, policy.connect_timeout)),
            thread::sleep,
        )?;

        Ok(RpcClient { runtime, client: ModelServiceClient::new(channel), call_timeout: config.call_timeout() })
    }
}

impl Predictor for RpcClient {
    fn predict(&mut self, reading: &SensorReading) -> Result<PredictionResponse, ClientError> {
        let request = SensorRequest {
            device_id: reading.device_id.clone(),
            irradiation: reading.irradiation,
            module_temperature: reading.module_temperature,
            ambient_temperature: reading.ambient_temperature,
            timestamp: reading.timestamp,
        };

        let timeout = self.call_timeout;
        let client = &mut self.client;
        let reply = self.runtime
            .block_on(async move { tokio::time::timeout(timeout, client.predict(request)).await })
            .map_err(|_| ClientError::Timeout(timeout))??
            .into_inner();

        Ok(to_prediction(reply))
    }
}

async fn open_channel(endpoint: &Endpoint, timeout: Duration) -> Result<Channel, ClientError> {
    tokio::time::timeout(timeout, endpoint.connect())
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
        .map_err(ClientError::from)
}

/// Maps a service reply to a prediction response
///
/// # Arguments
///
/// * 'reply' - reply from the prediction service
fn to_prediction(reply: AiResponse) -> PredictionResponse {
    if reply.status != PredictionStatus::Ok.as_str() {
        return PredictionResponse::error(format!("prediction service answered with status {:?}", reply.status));
    }

    let score = reply.score.unwrap_or_default();
    PredictionResponse::Ok {
        forecast: ForecastVector(vec![score.irradiation, score.module_temperature, score.ambient_temperature]),
        final_score: reply.final_score,
    }
}
