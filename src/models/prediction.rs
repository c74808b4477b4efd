use std::fmt;
use std::fmt::Formatter;

/// Variables the forecaster is trained on and predicts, in model order
pub const TARGET_VARIABLES: [&str; 3] = ["IRRADIATION", "MODULE_TEMPERATURE", "AMBIENT_TEMPERATURE"];

/// A single telemetry sample from a device
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub device_id: String,
    pub irradiation: f64,
    pub module_temperature: f64,
    pub ambient_temperature: f64,
    pub timestamp: i64,
}

impl SensorReading {
    /// Returns the numeric part of the reading as a model input row.
    /// Device id and timestamp are not model inputs.
    pub fn feature_row(&self) -> FeatureRow {
        FeatureRow::new(
            &TARGET_VARIABLES,
            vec![self.irradiation, self.module_temperature, self.ambient_temperature],
        )
    }
}

/// A single tabular row, ordered column names with one value per column
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRow {
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureRow {
    pub fn new(columns: &[&str], values: Vec<f64>) -> Self {
        Self { columns: columns.iter().map(|c| c.to_string()).collect(), values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Forecast in real units, same variable order as the target scaler
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastVector(pub Vec<f64>);

impl ForecastVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for the given position or 0.0 when the forecast is shorter
    pub fn get_or_zero(&self, idx: usize) -> f64 {
        self.0.get(idx).copied().unwrap_or(0.0)
    }

    /// Reinterprets the forecast as a corrector input row named after the target variables.
    ///
    /// Returns None if the forecast length differs from the number of target variables.
    pub fn to_feature_row(&self) -> Option<FeatureRow> {
        if self.0.len() != TARGET_VARIABLES.len() {
            return None;
        }

        Some(FeatureRow::new(&TARGET_VARIABLES, self.0.clone()))
    }
}

impl fmt::Display for ForecastVector {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let parts = self.0.iter()
            .enumerate()
            .map(|(i, v)| format!("{}: {:.4}", TARGET_VARIABLES.get(i).unwrap_or(&"?"), v))
            .collect::<Vec<String>>();

        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictionStatus {
    Ok,
    Error,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Ok => "ok",
            PredictionStatus::Error => "error",
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one prediction, either fully populated or an error with detail
#[derive(Clone, Debug, PartialEq)]
pub enum PredictionResponse {
    Ok { forecast: ForecastVector, final_score: f64 },
    Error { error_detail: String },
}

impl PredictionResponse {
    pub fn error(detail: impl Into<String>) -> Self {
        PredictionResponse::Error { error_detail: detail.into() }
    }

    pub fn status(&self) -> PredictionStatus {
        match self {
            PredictionResponse::Ok { .. } => PredictionStatus::Ok,
            PredictionResponse::Error { .. } => PredictionStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_row_drops_identity_fields() {
        let reading = SensorReading {
            device_id: "dev42".to_string(),
            irradiation: 0.512,
            module_temperature: 45.3,
            ambient_temperature: 32.1,
            timestamp: 1_700_000_000,
        };
        let row = reading.feature_row();
        assert_eq!(row.columns, vec!["IRRADIATION", "MODULE_TEMPERATURE", "AMBIENT_TEMPERATURE"]);
        assert_eq!(row.values, vec![0.512, 45.3, 32.1]);
    }

    #[test]
    fn only_three_variable_forecast_becomes_a_row() {
        assert!(ForecastVector(vec![1.0, 2.0]).to_feature_row().is_none());
        assert!(ForecastVector(vec![1.0, 2.0, 3.0, 4.0]).to_feature_row().is_none());

        let row = ForecastVector(vec![1.0, 2.0, 3.0]).to_feature_row().unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.columns[2], "AMBIENT_TEMPERATURE");
    }

    #[test]
    fn status_follows_variant() {
        let ok = PredictionResponse::Ok { forecast: ForecastVector(vec![0.0; 3]), final_score: 1.0 };
        assert_eq!(ok.status().as_str(), "ok");
        assert_eq!(PredictionResponse::error("boom").status(), PredictionStatus::Error);
    }
}
