pub mod errors;

use std::fs;
use std::path::Path;
use log::info;
use serde::Deserialize;
use crate::inference::InferenceModel;
use crate::manager_corrector::errors::CorrectorError;
use crate::models::prediction::FeatureRow;

const ENSEMBLE_FILE: &str = "et_model.json";

/// Marker for a leaf node in the child arrays
const LEAF: i64 = -1;

/// One regression tree in flat array form, node 0 is the root.
/// A sample goes left when `x[feature] <= threshold`.
#[derive(Deserialize, Clone, Debug)]
pub struct Tree {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<f64>,
}

impl Tree {
    /// Checks that the arrays describe a well formed tree where every child lies after its parent,
    /// which guarantees that a walk terminates
    ///
    /// # Arguments
    ///
    /// * 'n_features' - number of features in the fitted schema
    fn validate(&self, n_features: usize) -> Result<(), String> {
        let n = self.value.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if [self.children_left.len(), self.children_right.len(), self.feature.len(), self.threshold.len()]
            .iter().any(|l| *l != n) {
            return Err("tree node arrays differ in length".to_string());
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF && right == LEAF {
                continue;
            }
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {} has invalid child {}", node, child));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {} splits on unknown feature {}", node, feature));
            }
        }

        Ok(())
    }

    /// Walks the tree for one sample and returns the leaf value
    fn predict(&self, values: &[f64]) -> f64 {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let feature = self.feature[node] as usize;
            node = if values[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }

        self.value[node]
    }
}

/// Persisted form of the ensemble
#[derive(Deserialize)]
struct EnsembleArtifact {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

/// Tree ensemble regressor refining a forecast into a final score, the mean of all trees
pub struct Corrector {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

impl Corrector {
    /// Loads the ensemble from `et_model.json` in the model directory
    ///
    /// # Arguments
    ///
    /// * 'model_dir' - directory holding the artifact
    pub fn load(model_dir: &Path) -> Result<Corrector, CorrectorError> {
        let path = model_dir.join(ENSEMBLE_FILE);
        let json = fs::read_to_string(&path)
            .map_err(|e| CorrectorError::Artifact(format!("{}: {}", path.display(), e)))?;
        let artifact: EnsembleArtifact = serde_json::from_str(&json)?;

        let corrector = Corrector::new(artifact.feature_names, artifact.trees)?;
        info!("corrector loaded from {} with {} trees", path.display(), corrector.trees.len());

        Ok(corrector)
    }

    /// Returns a validated corrector
    ///
    /// # Arguments
    ///
    /// * 'feature_names' - columns the ensemble was fitted on, in order
    /// * 'trees' - the trees of the ensemble
    pub fn new(feature_names: Vec<String>, trees: Vec<Tree>) -> Result<Corrector, CorrectorError> {
        if feature_names.is_empty() {
            return Err(CorrectorError::Artifact("ensemble has no feature names".to_string()));
        }
        if trees.is_empty() {
            return Err(CorrectorError::Artifact("ensemble has no trees".to_string()));
        }
        for (i, tree) in trees.iter().enumerate() {
            tree.validate(feature_names.len())
                .map_err(|e| CorrectorError::Artifact(format!("tree {}: {}", i, e)))?;
        }

        Ok(Corrector { feature_names, trees })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Scores one row, the row must carry exactly the fitted columns in fitted order
    ///
    /// # Arguments
    ///
    /// * 'row' - input row in raw units
    pub fn correct(&self, row: &FeatureRow) -> Result<f64, CorrectorError> {
        if row.columns.len() != row.values.len() {
            return Err(CorrectorError::Shape(
                format!("{} column names for {} values", row.columns.len(), row.values.len())));
        }
        if row.columns != self.feature_names {
            return Err(CorrectorError::Schema { expected: self.feature_names.clone(), got: row.columns.clone() });
        }

        let sum = self.trees.iter().map(|t| t.predict(&row.values)).sum::<f64>();

        Ok(sum / self.trees.len() as f64)
    }
}

impl InferenceModel for Corrector {
    type Input = FeatureRow;
    type Output = f64;
    type Error = CorrectorError;

    fn load(model_dir: &Path) -> Result<Self, Self::Error> {
        Corrector::load(model_dir)
    }

    fn infer(&self, input: &FeatureRow) -> Result<f64, CorrectorError> {
        self.correct(input)
    }
}
