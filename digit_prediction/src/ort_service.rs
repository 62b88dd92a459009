use crate::{
    config::ModelConfig,
    model_service::{ModelError, ModelService},
};
use async_trait::async_trait;
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let model_path = model_config.get_path();
        if !model_path.exists() {
            tracing::error!(
                critical = true,
                path = %model_path.display(),
                "Model file not found"
            );
            return Err(ModelError::ModelNotFound(model_path));
        }

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(&model_path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    path = %model_path.display(),
                    "Failed to load model"
                );
                ModelError::Load(e.to_string())
            })?;

        if let Some(session) = sessions.first() {
            let session = session
                .lock()
                .map_err(|e| ModelError::Load(format!("session mutex poisoned: {}", e)))?;
            let output_names: Vec<&str> = session
                .outputs
                .iter()
                .map(|output| output.name.as_str())
                .collect();
            check_output_name(&output_names, &model_config.output_name).inspect_err(|e| {
                tracing::error!(error = %e, path = %model_path.display(), "Model output mismatch")
            })?;
        }

        tracing::info!(
            "Created {} ONNX sessions from {}",
            num_instances,
            model_path.display()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: model_config.output_name.clone(),
        })
    }

    pub fn run_inference(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ModelError::InvalidOutput(format!("no output named {:?}", self.output_name))
        })?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InvalidOutput(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

fn check_output_name(output_names: &[&str], output_name: &str) -> Result<(), ModelError> {
    if output_names.contains(&output_name) {
        return Ok(());
    }
    Err(ModelError::Load(format!(
        "model has no output named {:?} (available: {:?})",
        output_name, output_names
    )))
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.run_inference(&input))
            .await
            .map_err(|e| ModelError::Inference(format!("inference task failed: {}", e)))?
    }
}
