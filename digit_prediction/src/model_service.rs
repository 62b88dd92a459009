use async_trait::async_trait;
use ndarray::Array4;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

/// A loaded digit classifier.
///
/// `predict` takes a `(1, 28, 28, 1)` tensor and returns one probability per class.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError>;
}
