use std::path::Path;
use log::{error, info};
use crate::errors::LoadError;
use crate::inference::InferenceModel;
use crate::manager_corrector::Corrector;
use crate::manager_corrector::errors::CorrectorError;
use crate::manager_forecaster::Forecaster;
use crate::models::prediction::{FeatureRow, ForecastVector, PredictionResponse, SensorReading, TARGET_VARIABLES};

/// Chains a forecaster and a corrector: the forecast is always computed first and is part of
/// the response, the corrector refines it into a final score.
///
/// Holds no per call state, so one instance is shared by all concurrent calls.
pub struct Pipeline<F, C> {
    forecaster: F,
    corrector: C,
}

impl Pipeline<Forecaster, Corrector> {
    /// Loads both models from the model directory
    ///
    /// # Arguments
    ///
    /// * 'model_dir' - directory holding all model artifacts
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let forecaster = Forecaster::load(model_dir)?;
        let corrector = Corrector::load(model_dir)?;

        if corrector.feature_names().len() != forecaster.output_size() {
            return Err(LoadError::Corrector(CorrectorError::Artifact(
                format!("corrector expects {} features, forecaster produces {}",
                        corrector.feature_names().len(), forecaster.output_size()))));
        }

        Ok(Pipeline::new(forecaster, corrector))
    }
}

impl<F, C> Pipeline<F, C>
where
    F: InferenceModel<Input = FeatureRow, Output = ForecastVector>,
    C: InferenceModel<Input = FeatureRow, Output = f64>,
{
    pub fn new(forecaster: F, corrector: C) -> Self {
        Self { forecaster, corrector }
    }

    /// Runs the two stage prediction for one reading.
    ///
    /// A failing stage ends the call with an error response, the corrector is never invoked
    /// unless the forecaster succeeded with exactly one value per target variable.
    ///
    /// # Arguments
    ///
    /// * 'reading' - the sensor reading to predict from
    pub fn predict(&self, reading: &SensorReading) -> PredictionResponse {
        info!("request from device {}: IRRADIATION {}, MODULE_TEMPERATURE {}, AMBIENT_TEMPERATURE {}, TIMESTAMP {}",
              reading.device_id, reading.irradiation, reading.module_temperature,
              reading.ambient_temperature, reading.timestamp);

        let forecast = match self.forecaster.infer(&reading.feature_row()) {
            Ok(forecast) => forecast,
            Err(e) => return fail(reading, format!("forecast failed: {}", e)),
        };
        info!("device {} forecast: {}", reading.device_id, forecast);

        let Some(row) = forecast.to_feature_row() else {
            return fail(reading, format!("forecast has {} values, corrector needs {}",
                                         forecast.len(), TARGET_VARIABLES.len()));
        };

        let final_score = match self.corrector.infer(&row) {
            Ok(score) => score,
            Err(e) => return fail(reading, format!("correction failed: {}", e)),
        };
        info!("device {} final score: {}", reading.device_id, final_score);

        PredictionResponse::Ok { forecast, final_score }
    }
}

fn fail(reading: &SensorReading, detail: String) -> PredictionResponse {
    error!("prediction for device {} failed: {}", reading.device_id, detail);
    PredictionResponse::error(detail)
}
