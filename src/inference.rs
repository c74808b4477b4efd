use std::fmt::Display;
use std::path::Path;

/// A loaded, read-only predictive model.
///
/// Implementors are loaded once at process start and then shared between concurrent calls,
/// `infer` must not mutate any state.
pub trait InferenceModel: Send + Sync + Sized {
    type Input;
    type Output;
    type Error: Display;

    /// Loads the model from its artifacts in the given directory
    ///
    /// # Arguments
    ///
    /// * 'model_dir' - directory holding the model artifacts
    fn load(model_dir: &Path) -> Result<Self, Self::Error>;

    /// Runs inference on one input
    ///
    /// # Arguments
    ///
    /// * 'input' - the model input
    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}
