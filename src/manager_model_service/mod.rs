use std::future::Future;
use std::sync::Arc;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use crate::errors::ServiceError;
use crate::inference::InferenceModel;
use crate::models::prediction::{FeatureRow, ForecastVector, PredictionResponse, PredictionStatus, SensorReading};
use crate::prediction::Pipeline;
use crate::proto::model_service_server::{ModelService, ModelServiceServer};
use crate::proto::{AiResponse, AiScores, SensorRequest, FILE_DESCRIPTOR_SET};

impl From<SensorRequest> for SensorReading {
    fn from(r: SensorRequest) -> Self {
        SensorReading {
            device_id: r.device_id,
            irradiation: r.irradiation,
            module_temperature: r.module_temperature,
            ambient_temperature: r.ambient_temperature,
            timestamp: r.timestamp,
        }
    }
}

impl From<&ForecastVector> for AiScores {
    fn from(f: &ForecastVector) -> Self {
        AiScores {
            irradiation: f.get_or_zero(0),
            module_temperature: f.get_or_zero(1),
            ambient_temperature: f.get_or_zero(2),
        }
    }
}

/// The prediction endpoint, runs each call on a bounded pool of blocking workers
pub struct PredictionService<F, C> {
    pipeline: Arc<Pipeline<F, C>>,
    workers: Arc<Semaphore>,
}

impl<F, C> PredictionService<F, C> {
    /// Returns a new service
    ///
    /// # Arguments
    ///
    /// * 'pipeline' - the loaded model pipeline, shared read only by all calls
    /// * 'max_workers' - max number of predictions running at the same time
    pub fn new(pipeline: Pipeline<F, C>, max_workers: usize) -> Self {
        Self { pipeline: Arc::new(pipeline), workers: Arc::new(Semaphore::new(max_workers.max(1))) }
    }
}

#[tonic::async_trait]
impl<F, C> ModelService for PredictionService<F, C>
where
    F: InferenceModel<Input = FeatureRow, Output = ForecastVector> + 'static,
    C: InferenceModel<Input = FeatureRow, Output = f64> + 'static,
{
    async fn predict(&self, request: Request<SensorRequest>) -> Result<Response<AiResponse>, Status> {
        let reading = SensorReading::from(request.into_inner());

        let permit = Arc::clone(&self.workers).acquire_owned().await
            .map_err(|e| Status::unavailable(format!("worker pool closed: {}", e)))?;
        let pipeline = Arc::clone(&self.pipeline);

        let response = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.predict(&reading)
        })
            .await
            .map_err(|e| {
                error!("prediction worker failed: {}", e);
                Status::internal(format!("prediction worker failed: {}", e))
            })?;

        match response {
            PredictionResponse::Ok { forecast, final_score } => {
                let reply = AiResponse {
                    status: PredictionStatus::Ok.to_string(),
                    score: Some(AiScores::from(&forecast)),
                    final_score,
                };
                info!("sending response: {:?}", reply);
                Ok(Response::new(reply))
            }
            PredictionResponse::Error { error_detail } => Err(Status::internal(error_detail)),
        }
    }
}

/// Serves the prediction service and schema reflection on an already bound listener until the
/// shutdown future completes
///
/// # Arguments
///
/// * 'listener' - bound listener to accept connections on
/// * 'service' - the prediction service
/// * 'shutdown' - future completing when the server should stop
pub async fn serve<F, C, S>(listener: TcpListener, service: PredictionService<F, C>, shutdown: S) -> Result<(), ServiceError>
where
    F: InferenceModel<Input = FeatureRow, Output = ForecastVector> + 'static,
    C: InferenceModel<Input = FeatureRow, Output = f64> + 'static,
    S: Future<Output = ()>,
{
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let reflection_v1alpha = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1alpha()?;

    info!("server started on {}", listener.local_addr()?);

    Server::builder()
        .add_service(ModelServiceServer::new(service))
        .add_service(reflection)
        .add_service(reflection_v1alpha)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    info!("server shut down");
    Ok(())
}
