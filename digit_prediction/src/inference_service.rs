use crate::{
    error::GatewayError,
    model_service::{ModelError, ModelService},
    prediction::PredictionResult,
    preprocessing::preprocess_image,
};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn predict(&self, image_data: &[u8]) -> Result<PredictionResult, GatewayError> {
        let input = preprocess_image(image_data)?;

        let probabilities = self.model_service.predict(input).await.inspect_err(|e| {
            if let ModelError::ModelNotFound(path) = e {
                tracing::error!(critical = true, path = ?path, "Model file missing during inference");
            } else {
                tracing::error!(error = %e, "Inference failed");
            }
        })?;
        tracing::debug!("Raw class probabilities: {:?}", probabilities);

        let prediction = PredictionResult::from_probabilities(&probabilities)
            .inspect_err(|e| tracing::error!(error = %e, "Unusable classifier output"))?;

        tracing::info!(
            predicted_class = prediction.predicted_class,
            confidence = prediction.confidence,
            "Prediction completed"
        );

        Ok(prediction)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Luma};
    use ndarray::Array4;
    use std::io::Cursor;
    use std::sync::Mutex;

    pub const KNOWN_PROBABILITIES: [f32; 10] =
        [0.1, 0.05, 0.02, 0.01, 0.01, 0.01, 0.02, 0.7, 0.05, 0.03];

    pub struct MockModelService {
        pub output: Result<Vec<f32>, fn() -> ModelError>,
        pub seen_shapes: Mutex<Vec<Vec<usize>>>,
    }

    impl MockModelService {
        pub fn returning(output: Vec<f32>) -> Self {
            Self {
                output: Ok(output),
                seen_shapes: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: fn() -> ModelError) -> Self {
            Self {
                output: Err(error),
                seen_shapes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelService for MockModelService {
        async fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            self.seen_shapes.lock().unwrap().push(input.shape().to_vec());
            match &self.output {
                Ok(output) => Ok(output.clone()),
                Err(error) => Err(error()),
            }
        }
    }

    pub fn png_digit() -> Vec<u8> {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(64, 64, |x, _| {
            if (28..36).contains(&x) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let mut image_data = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[tokio::test]
    async fn test_predict() -> Result<(), Box<dyn std::error::Error>> {
        let inference_service =
            InferenceService::new(MockModelService::returning(KNOWN_PROBABILITIES.to_vec()));

        let prediction = inference_service.predict(&png_digit()).await?;

        assert_eq!(prediction.predicted_class, 7);
        assert!((prediction.confidence - 70.0).abs() < 1e-4);
        assert_eq!(
            *inference_service.model_service.seen_shapes.lock().unwrap(),
            vec![vec![1, 28, 28, 1]]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_image_never_reaches_the_model() {
        let inference_service =
            InferenceService::new(MockModelService::returning(KNOWN_PROBABILITIES.to_vec()));

        let result = inference_service.predict(b"not an image").await;

        assert!(matches!(result, Err(GatewayError::Preprocessing(_))));
        assert!(inference_service.model_service.seen_shapes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_propagated() {
        let inference_service = InferenceService::new(MockModelService::failing(|| {
            ModelError::Inference("session crashed".to_string())
        }));

        let result = inference_service.predict(&png_digit()).await;

        assert!(matches!(
            result,
            Err(GatewayError::Model(ModelError::Inference(_)))
        ));
    }

    #[tokio::test]
    async fn test_wrong_output_size_is_rejected() {
        let inference_service = InferenceService::new(MockModelService::returning(vec![1.0]));

        let result = inference_service.predict(&png_digit()).await;

        assert!(matches!(
            result,
            Err(GatewayError::Model(ModelError::InvalidOutput(_)))
        ));
    }
}
