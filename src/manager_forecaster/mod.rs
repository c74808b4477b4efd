pub mod errors;
pub mod scaler;

use std::collections::HashMap;
use std::path::Path;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{GRUConfig, Linear, VarBuilder, GRU, RNN};
use log::{debug, info};
use crate::inference::InferenceModel;
use crate::manager_forecaster::errors::ForecastError;
use crate::manager_forecaster::scaler::Scaler;
use crate::models::prediction::{FeatureRow, ForecastVector};

/// Hidden width of the recurrent layer, fixed by the trained network topology
pub const HIDDEN_SIZE: usize = 64;

const FEATURE_SCALER_FILE: &str = "feature_scaler.json";
const TARGET_SCALER_FILE: &str = "target_scaler.json";
const WEIGHTS_SAFETENSORS_FILE: &str = "gru_model.safetensors";
const WEIGHTS_PTH_FILE: &str = "gru_model.pth";

/// State dict keys of a single layer, unidirectional GRU followed by the projection
const WEIGHT_KEYS: [&str; 6] = [
    "gru.weight_ih_l0",
    "gru.weight_hh_l0",
    "gru.bias_ih_l0",
    "gru.bias_hh_l0",
    "fc.weight",
    "fc.bias",
];

/// Model input after applying the feature scaler
#[derive(Clone, Debug, PartialEq)]
pub struct ScaledFeatureVector(pub Vec<f64>);

/// Single layer GRU followed by a linear projection of the last hidden state
struct GruNet {
    gru: GRU,
    fc: Linear,
}

impl GruNet {
    /// Builds the network from weights keyed as in a PyTorch state dict
    /// (`gru.weight_ih_l0`, ..., `fc.weight`, `fc.bias`)
    ///
    /// # Arguments
    ///
    /// * 'vb' - var builder holding the weights
    /// * 'input_size' - number of input features
    /// * 'output_size' - number of predicted variables
    fn load(vb: VarBuilder, input_size: usize, output_size: usize) -> candle_core::Result<GruNet> {
        let gru = candle_nn::gru(input_size, HIDDEN_SIZE, GRUConfig::default(), vb.pp("gru"))?;
        let fc = candle_nn::linear(HIDDEN_SIZE, output_size, vb.pp("fc"))?;

        Ok(GruNet { gru, fc })
    }

    /// Runs a (batch, seq, features) tensor through the network from a zero initial state
    /// and returns the (batch, output) projection of the final timestep
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let states = self.gru.seq(x)?;
        let last = states.last()
            .ok_or_else(|| candle_core::Error::Msg("empty input sequence".to_string()))?;

        self.fc.forward(last.h())
    }
}

/// Short horizon forecaster, scales a reading, runs the recurrent network on it
/// and returns the forecast in real units
pub struct Forecaster {
    feature_scaler: Scaler,
    target_scaler: Scaler,
    net: GruNet,
    device: Device,
}

impl Forecaster {
    /// Loads scalers and network weights from the model directory
    ///
    /// Weights are read from `gru_model.safetensors` if present, otherwise from the PyTorch
    /// state dict `gru_model.pth`. Weight shapes must agree with the scalers' dimensionality
    /// and the hidden width.
    ///
    /// # Arguments
    ///
    /// * 'model_dir' - directory holding the artifacts
    pub fn load(model_dir: &Path) -> Result<Forecaster, ForecastError> {
        let device = select_device()?;

        let feature_scaler = Scaler::load(&model_dir.join(FEATURE_SCALER_FILE))?;
        let target_scaler = Scaler::load(&model_dir.join(TARGET_SCALER_FILE))?;
        let weights = load_weights(model_dir, &device)?;

        let forecaster = Forecaster::from_weights(feature_scaler, target_scaler, weights, device)?;
        info!("forecaster loaded from {}", model_dir.display());

        Ok(forecaster)
    }

    /// Builds a forecaster from already loaded scalers and weights
    ///
    /// # Arguments
    ///
    /// * 'feature_scaler' - scaler applied to the input
    /// * 'target_scaler' - scaler inverted on the output
    /// * 'weights' - network weights keyed by state dict name
    /// * 'device' - device to run inference on
    pub fn from_weights(
        feature_scaler: Scaler,
        target_scaler: Scaler,
        weights: HashMap<String, Tensor>,
        device: Device) -> Result<Forecaster, ForecastError> {

        let input_size = feature_scaler.dim();
        let output_size = target_scaler.dim();
        check_weight_keys(&weights)?;

        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let net = GruNet::load(vb, input_size, output_size)
            .map_err(|e| ForecastError::Artifact(
                format!("network weights do not fit {} -> GRU({}) -> {}: {}", input_size, HIDDEN_SIZE, output_size, e)))?;

        Ok(Forecaster { feature_scaler, target_scaler, net, device })
    }

    /// Number of features expected as input
    pub fn input_size(&self) -> usize {
        self.feature_scaler.dim()
    }

    /// Number of variables forecasted
    pub fn output_size(&self) -> usize {
        self.target_scaler.dim()
    }

    /// Forecasts from a single reading presented as a sequence of length one
    ///
    /// # Arguments
    ///
    /// * 'row' - raw input values in feature scaler order
    pub fn forecast(&self, row: &FeatureRow) -> Result<ForecastVector, ForecastError> {
        if row.columns.len() != row.values.len() {
            return Err(ForecastError::Shape(
                format!("{} column names for {} values", row.columns.len(), row.values.len())));
        }
        if row.len() != self.input_size() {
            return Err(ForecastError::Dimension { expected: self.input_size(), got: row.len() });
        }

        let scaled = ScaledFeatureVector(self.feature_scaler.transform(&row.values)?);
        let raw = self.run(&scaled)?;

        Ok(ForecastVector(self.target_scaler.inverse_transform(&raw)?))
    }

    fn run(&self, scaled: &ScaledFeatureVector) -> Result<Vec<f64>, ForecastError> {
        let data = scaled.0.iter().map(|v| *v as f32).collect::<Vec<f32>>();
        let x = Tensor::from_vec(data, (1, 1, scaled.0.len()), &self.device)?;

        let output = self.net.forward(&x)?
            .squeeze(0)?
            .to_vec1::<f32>()?;
        debug!("forecaster raw output: {:?}", output);

        Ok(output.into_iter().map(f64::from).collect())
    }
}

impl InferenceModel for Forecaster {
    type Input = FeatureRow;
    type Output = ForecastVector;
    type Error = ForecastError;

    fn load(model_dir: &Path) -> Result<Self, Self::Error> {
        Forecaster::load(model_dir)
    }

    fn infer(&self, input: &FeatureRow) -> Result<ForecastVector, ForecastError> {
        self.forecast(input)
    }
}

/// Selects CUDA if available, otherwise CPU
fn select_device() -> Result<Device, ForecastError> {
    if candle_core::utils::cuda_is_available() {
        info!("CUDA available - using GPU for inference");
        Ok(Device::new_cuda(0)?)
    } else {
        info!("CUDA not available - using CPU for inference");
        Ok(Device::Cpu)
    }
}

/// Rejects weights holding anything beyond the expected topology, such as additional layers
/// (`gru.*_l1`) or a reverse direction (`gru.*_l0_reverse`)
///
/// # Arguments
///
/// * 'weights' - network weights keyed by state dict name
fn check_weight_keys(weights: &HashMap<String, Tensor>) -> Result<(), ForecastError> {
    let mut unexpected = weights.keys()
        .filter(|k| !WEIGHT_KEYS.contains(&k.as_str()))
        .map(|k| k.as_str())
        .collect::<Vec<&str>>();

    if unexpected.is_empty() {
        Ok(())
    } else {
        unexpected.sort();
        Err(ForecastError::Artifact(
            format!("network weights do not fit a single layer GRU({}), unexpected tensors: {}",
                    HIDDEN_SIZE, unexpected.join(", "))))
    }
}

/// Loads network weights, safetensors take precedence over a PyTorch state dict
///
/// # Arguments
///
/// * 'model_dir' - directory holding the weights file
/// * 'device' - device to load tensors onto
fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>, ForecastError> {
    let safetensors = model_dir.join(WEIGHTS_SAFETENSORS_FILE);
    let pth = model_dir.join(WEIGHTS_PTH_FILE);

    if safetensors.exists() {
        Ok(candle_core::safetensors::load(&safetensors, device)?)
    } else if pth.exists() {
        Ok(candle_core::pickle::read_all(&pth)?.into_iter().collect())
    } else {
        Err(ForecastError::Artifact(
            format!("no network weights found in {} ({} or {})", model_dir.display(), WEIGHTS_SAFETENSORS_FILE, WEIGHTS_PTH_FILE)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;
    use super::*;

    const IDENTITY_SCALER: &str = r#"{"kind": "standard", "mean": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0]}"#;

    /// Weights where only `fc_bias` is non zero, so the network output equals `fc_bias`
    fn zero_weights(hidden: usize, fc_bias: [f32; 3]) -> HashMap<String, Tensor> {
        let dev = Device::Cpu;
        let mut weights: HashMap<String, Tensor> = HashMap::new();
        weights.insert("gru.weight_ih_l0".into(), Tensor::zeros((3 * hidden, 3), DType::F32, &dev).unwrap());
        weights.insert("gru.weight_hh_l0".into(), Tensor::zeros((3 * hidden, hidden), DType::F32, &dev).unwrap());
        weights.insert("gru.bias_ih_l0".into(), Tensor::zeros(3 * hidden, DType::F32, &dev).unwrap());
        weights.insert("gru.bias_hh_l0".into(), Tensor::zeros(3 * hidden, DType::F32, &dev).unwrap());
        weights.insert("fc.weight".into(), Tensor::zeros((3, hidden), DType::F32, &dev).unwrap());
        weights.insert("fc.bias".into(), Tensor::new(&fc_bias, &dev).unwrap());
        weights
    }

    fn write_scalers(dir: &Path) {
        fs::write(dir.join(FEATURE_SCALER_FILE),
                  r#"{"kind": "standard", "mean": [0.5, 45.0, 30.0], "scale": [0.25, 10.0, 5.0]}"#).unwrap();
        fs::write(dir.join(TARGET_SCALER_FILE),
                  r#"{"kind": "standard", "mean": [0.4, 40.0, 30.0], "scale": [0.2, 10.0, 5.0]}"#).unwrap();
    }

    /// Writes a complete artifact set where the network output equals `fc_bias`
    pub(crate) fn write_artifacts(dir: &Path, hidden: usize, fc_bias: [f32; 3]) {
        write_scalers(dir);
        candle_core::safetensors::save(&zero_weights(hidden, fc_bias), dir.join(WEIGHTS_SAFETENSORS_FILE)).unwrap();
    }

    fn wave(len: usize, phase: f32) -> Vec<f32> {
        (0..len).map(|i| 0.5 * (0.37 * i as f32 + phase).sin()).collect()
    }

    fn sigmoid(v: f64) -> f64 {
        1.0 / (1.0 + (-v).exp())
    }

    fn row(values: Vec<f64>) -> FeatureRow {
        let columns = ["IRRADIATION", "MODULE_TEMPERATURE", "AMBIENT_TEMPERATURE"];
        FeatureRow::new(&columns[..values.len().min(3)], values)
    }

    #[test]
    fn forecast_is_inverse_scaled_network_output() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), HIDDEN_SIZE, [1.0, -1.0, 0.5]);

        let forecaster = Forecaster::load(dir.path()).unwrap();
        assert_eq!(forecaster.input_size(), 3);
        assert_eq!(forecaster.output_size(), 3);

        let forecast = forecaster.forecast(&row(vec![0.512, 45.3, 32.1])).unwrap();
        let expected = [0.6, 30.0, 32.5];
        assert_eq!(forecast.len(), 3);
        for (got, want) in forecast.values().iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "got {}, want {}", got, want);
        }
    }

    #[test]
    fn forecast_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), HIDDEN_SIZE, [0.3, 0.2, 0.1]);
        let forecaster = Forecaster::load(dir.path()).unwrap();

        let input = row(vec![0.9, 55.0, 40.0]);
        let first = forecaster.forecast(&input).unwrap();
        let second = forecaster.forecast(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wrong_input_dimension_is_a_call_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), HIDDEN_SIZE, [0.0, 0.0, 0.0]);
        let forecaster = Forecaster::load(dir.path()).unwrap();

        match forecaster.forecast(&row(vec![0.5, 45.0])) {
            Err(ForecastError::Dimension { expected: 3, got: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn hidden_width_mismatch_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), 32, [0.0, 0.0, 0.0]);

        assert!(matches!(Forecaster::load(dir.path()), Err(ForecastError::Artifact(_))));
    }

    #[test]
    fn extra_layers_fail_at_load() {
        for extra in ["gru.weight_ih_l1", "gru.bias_hh_l1", "gru.weight_ih_l0_reverse"] {
            let dir = tempfile::tempdir().unwrap();
            write_scalers(dir.path());

            let mut weights = zero_weights(HIDDEN_SIZE, [0.0, 0.0, 0.0]);
            weights.insert(extra.to_string(), Tensor::zeros((3 * HIDDEN_SIZE, HIDDEN_SIZE), DType::F32, &Device::Cpu).unwrap());
            candle_core::safetensors::save(&weights, dir.path().join(WEIGHTS_SAFETENSORS_FILE)).unwrap();

            match Forecaster::load(dir.path()) {
                Err(ForecastError::Artifact(msg)) => assert!(msg.contains(extra), "{}", msg),
                Err(e) => panic!("unexpected error for {}: {}", extra, e),
                Ok(_) => panic!("{} accepted as a single layer GRU", extra),
            }
        }
    }

    #[test]
    fn gru_step_matches_reference_computation() {
        let h = HIDDEN_SIZE;
        let w_ih = wave(3 * h * 3, 0.1);
        let w_hh = wave(3 * h * h, 0.2);
        let b_ih = wave(3 * h, 0.3);
        let b_hh = wave(3 * h, 0.4);
        let fc_w = wave(3 * h, 0.5);
        let fc_b = wave(3, 0.6);

        let dev = Device::Cpu;
        let mut weights: HashMap<String, Tensor> = HashMap::new();
        weights.insert("gru.weight_ih_l0".into(), Tensor::from_vec(w_ih.clone(), (3 * h, 3), &dev).unwrap());
        weights.insert("gru.weight_hh_l0".into(), Tensor::from_vec(w_hh, (3 * h, h), &dev).unwrap());
        weights.insert("gru.bias_ih_l0".into(), Tensor::from_vec(b_ih.clone(), 3 * h, &dev).unwrap());
        weights.insert("gru.bias_hh_l0".into(), Tensor::from_vec(b_hh.clone(), 3 * h, &dev).unwrap());
        weights.insert("fc.weight".into(), Tensor::from_vec(fc_w.clone(), (3, h), &dev).unwrap());
        weights.insert("fc.bias".into(), Tensor::from_vec(fc_b.clone(), 3, &dev).unwrap());

        let identity = serde_json::from_str::<Scaler>(IDENTITY_SCALER).unwrap();
        let forecaster = Forecaster::from_weights(identity.clone(), identity, weights, dev).unwrap();

        // one step from a zero hidden state, gates in r, z, n order
        let x: [f64; 3] = [0.3f32, -0.8, 1.2].map(f64::from);
        let at = |v: &[f32], i: usize| f64::from(v[i]);
        let input_gate = |g: usize, j: usize| {
            let r = g * h + j;
            at(&b_ih, r) + (0..3).map(|k| at(&w_ih, r * 3 + k) * x[k]).sum::<f64>()
        };
        let hidden = (0..h)
            .map(|j| {
                let r = sigmoid(input_gate(0, j) + at(&b_hh, j));
                let z = sigmoid(input_gate(1, j) + at(&b_hh, h + j));
                let n = (input_gate(2, j) + r * at(&b_hh, 2 * h + j)).tanh();
                (1.0 - z) * n
            })
            .collect::<Vec<f64>>();
        let expected = (0..3)
            .map(|o| at(&fc_b, o) + (0..h).map(|j| at(&fc_w, o * h + j) * hidden[j]).sum::<f64>())
            .collect::<Vec<f64>>();

        let forecast = forecaster.forecast(&row(x.to_vec())).unwrap();
        for (got, want) in forecast.values().iter().zip(&expected) {
            assert!((got - want).abs() < 1e-4, "got {:?}, want {:?}", forecast.values(), expected);
        }
    }

    #[test]
    fn ragged_row_is_a_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), HIDDEN_SIZE, [0.0, 0.0, 0.0]);
        let forecaster = Forecaster::load(dir.path()).unwrap();

        let ragged = FeatureRow::new(&["IRRADIATION", "MODULE_TEMPERATURE"], vec![0.5, 45.0, 30.0]);
        assert!(matches!(forecaster.forecast(&ragged), Err(ForecastError::Shape(_))));
    }

    #[test]
    fn pth_state_dict_is_read_when_no_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fc_state_dict.pth");
        fs::copy(&fixture, dir.path().join(WEIGHTS_PTH_FILE)).unwrap();

        let weights = load_weights(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights["fc.weight"].to_vec2::<f32>().unwrap(), vec![vec![0.5, -0.25], vec![1.0, 2.0], vec![-1.5, 0.75]]);
        assert_eq!(weights["fc.bias"].to_vec1::<f32>().unwrap(), vec![1.0, -1.0, 0.5]);

        // safetensors take precedence
        candle_core::safetensors::save(&zero_weights(HIDDEN_SIZE, [0.0, 0.0, 0.0]), dir.path().join(WEIGHTS_SAFETENSORS_FILE)).unwrap();
        let weights = load_weights(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(weights.len(), 6);
        assert_eq!(weights["fc.bias"].to_vec1::<f32>().unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_artifacts_fail_at_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Forecaster::load(dir.path()).is_err());

        write_artifacts(dir.path(), HIDDEN_SIZE, [0.0, 0.0, 0.0]);
        fs::remove_file(dir.path().join(WEIGHTS_SAFETENSORS_FILE)).unwrap();
        assert!(matches!(Forecaster::load(dir.path()), Err(ForecastError::Artifact(_))));
    }

    #[test]
    fn malformed_scaler_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), HIDDEN_SIZE, [0.0, 0.0, 0.0]);
        fs::write(dir.path().join(TARGET_SCALER_FILE), "{not json").unwrap();

        assert!(Forecaster::load(dir.path()).is_err());
    }
}
