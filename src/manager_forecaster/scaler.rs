use std::fs;
use std::path::Path;
use serde::Deserialize;
use crate::manager_forecaster::errors::ForecastError;

/// A fitted, invertible per-feature normalization
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// Standardization, `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// Range scaling, `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl Scaler {
    /// Loads and validates a scaler from a JSON file
    ///
    /// # Arguments
    ///
    /// * 'path' - path to the scaler file
    pub fn load(path: &Path) -> Result<Scaler, ForecastError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ForecastError::Artifact(format!("{}: {}", path.display(), e)))?;
        let scaler: Scaler = serde_json::from_str(&json)?;
        scaler.validate()?;

        Ok(scaler)
    }

    /// Number of features the scaler was fitted on
    pub fn dim(&self) -> usize {
        match self {
            Scaler::Standard { scale, .. } | Scaler::MinMax { scale, .. } => scale.len(),
        }
    }

    /// Scales raw values
    ///
    /// # Arguments
    ///
    /// * 'values' - values in real units
    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.check_dim(values)?;

        Ok(match self {
            Scaler::Standard { mean, scale } => values.iter().zip(mean).zip(scale)
                .map(|((x, m), s)| (x - m) / s)
                .collect(),
            Scaler::MinMax { min, scale } => values.iter().zip(min).zip(scale)
                .map(|((x, m), s)| x * s + m)
                .collect(),
        })
    }

    /// Brings scaled values back to real units
    ///
    /// # Arguments
    ///
    /// * 'values' - scaled values
    pub fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.check_dim(values)?;

        Ok(match self {
            Scaler::Standard { mean, scale } => values.iter().zip(mean).zip(scale)
                .map(|((x, m), s)| x * s + m)
                .collect(),
            Scaler::MinMax { min, scale } => values.iter().zip(min).zip(scale)
                .map(|((x, m), s)| (x - m) / s)
                .collect(),
        })
    }

    fn check_dim(&self, values: &[f64]) -> Result<(), ForecastError> {
        if values.len() != self.dim() {
            return Err(ForecastError::Dimension { expected: self.dim(), got: values.len() });
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ForecastError> {
        let (offset, scale) = match self {
            Scaler::Standard { mean, scale } => (mean, scale),
            Scaler::MinMax { min, scale } => (min, scale),
        };

        if scale.is_empty() {
            return Err(ForecastError::Scaler("scaler has no features".to_string()));
        }
        if offset.len() != scale.len() {
            return Err(ForecastError::Scaler(
                format!("offset and scale length differ ({} vs {})", offset.len(), scale.len())));
        }
        if offset.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::Scaler("scaler holds non finite values".to_string()));
        }
        if scale.iter().any(|s| *s == 0.0) {
            return Err(ForecastError::Scaler("scaler holds a zero scale".to_string()));
        }

        Ok(())
    }
}
