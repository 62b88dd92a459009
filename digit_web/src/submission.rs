use crate::{
    form::ImageUpload,
    prediction::{PredictionService, PredictionServiceError},
    repository::{NewPredictionRecord, PersistenceError, PredictionRecord, PredictionRepository},
    storage::ImageStore,
};
use chrono::Local;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// URL prefix the stored uploads are served under.
pub const MEDIA_URL_PREFIX: &str = "/media";

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("prediction service URL is not configured")]
    NotConfigured,
    #[error(transparent)]
    PredictionService(#[from] PredictionServiceError),
    #[error("failed to store uploaded image: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SubmissionError {
    /// Message shown to the user on the upload page.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::NotConfigured => {
                "The server configuration for predictions is incomplete.".to_string()
            }
            SubmissionError::PredictionService(PredictionServiceError::Http { status, detail }) => {
                format!(
                    "Error ({}) contacting the prediction service: {}",
                    status, detail
                )
            }
            SubmissionError::PredictionService(PredictionServiceError::Network(e)) => {
                format!("Could not connect to the prediction service: {}", e)
            }
            SubmissionError::PredictionService(PredictionServiceError::IncompleteResponse) => {
                "The prediction service response was incomplete.".to_string()
            }
            other => format!("An unexpected error occurred: {}", other),
        }
    }

    /// Short label used for the submission metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            SubmissionError::NotConfigured => "not_configured",
            SubmissionError::PredictionService(PredictionServiceError::Http { .. }) => {
                "gateway_error"
            }
            SubmissionError::PredictionService(PredictionServiceError::Network(_)) => {
                "network_error"
            }
            SubmissionError::PredictionService(PredictionServiceError::IncompleteResponse) => {
                "incomplete_response"
            }
            _ => "unexpected_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub record: PredictionRecord,
    pub image_url: String,
}

pub struct SubmissionService {
    prediction_service: Option<PredictionService>,
    image_store: ImageStore,
    repository: Arc<dyn PredictionRepository>,
}

impl SubmissionService {
    pub fn new(
        prediction_service: Option<PredictionService>,
        image_store: ImageStore,
        repository: Arc<dyn PredictionRepository>,
    ) -> Self {
        Self {
            prediction_service,
            image_store,
            repository,
        }
    }

    pub fn image_store(&self) -> &ImageStore {
        &self.image_store
    }

    pub fn gateway_url(&self) -> Option<&str> {
        self.prediction_service.as_ref().map(PredictionService::url)
    }

    /// Sends the upload to the gateway and records the outcome. Nothing is
    /// stored unless the gateway returned both a class and a confidence.
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name))]
    pub async fn submit(&self, upload: &ImageUpload) -> Result<Submission, SubmissionError> {
        let prediction_service = self.prediction_service.as_ref().ok_or_else(|| {
            tracing::error!("Submission rejected: no prediction service URL configured");
            SubmissionError::NotConfigured
        })?;

        let prediction = prediction_service.predict(upload).await?;

        let created_on = Local::now().date_naive();
        let image = self
            .image_store
            .save(&upload.file_name, &upload.data, created_on)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to store uploaded image"))?;

        let new_record = NewPredictionRecord {
            image: image.clone(),
            created_on,
            predicted_class: prediction.predicted_class,
            confidence: prediction.confidence,
        };
        tracing::debug!("Saving prediction: {:?}", new_record);

        let record = match self.repository.insert(new_record).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist prediction");
                if let Err(cleanup_error) = self.image_store.remove(&image).await {
                    tracing::warn!(error = %cleanup_error, "Failed to remove orphaned upload {}", image);
                }
                return Err(e.into());
            }
        };

        tracing::info!("Prediction {} saved: {}", record.id, record);

        Ok(Submission {
            image_url: format!("{}/{}", MEDIA_URL_PREFIX, record.image),
            record,
        })
    }
}
