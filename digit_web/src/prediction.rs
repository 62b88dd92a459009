use crate::form::{ImageUpload, IMAGE_FIELD};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionServiceError {
    #[error("prediction service returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("{0}")]
    Network(reqwest::Error),
    #[error("prediction service response is missing predicted_class or confidence")]
    IncompleteResponse,
    #[error("invalid prediction service response: {0}")]
    InvalidResponse(String),
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub predicted_class: i64,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    predicted_class: Option<i64>,
    confidence: Option<f64>,
}

/// HTTP client for the prediction gateway's `POST /predict` endpoint.
#[derive(Debug, Clone)]
pub struct PredictionService {
    client: reqwest::Client,
    url: String,
}

impl PredictionService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PredictionServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PredictionServiceError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forwards the untouched upload to the gateway. Never retries.
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, bytes = upload.data.len()))]
    pub async fn predict(&self, upload: &ImageUpload) -> Result<Prediction, PredictionServiceError> {
        tracing::debug!("Sending image to {}", self.url);

        let form = Form::new().part(IMAGE_FIELD, image_part(upload));
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, timeout = e.is_timeout(), "Network error calling the prediction service");
                PredictionServiceError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %body,
                "Prediction service returned an error status"
            );
            return Err(PredictionServiceError::Http {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        tracing::info!("Prediction service call succeeded (status {})", status);

        let body: PredictionResponse = response
            .json()
            .await
            .map_err(|e| PredictionServiceError::InvalidResponse(e.to_string()))?;

        match (body.predicted_class, body.confidence) {
            (Some(predicted_class), Some(confidence)) => Ok(Prediction {
                predicted_class,
                confidence,
            }),
            _ => {
                tracing::error!("Prediction service response lacked expected data: {:?}", body);
                Err(PredictionServiceError::IncompleteResponse)
            }
        }
    }
}

fn image_part(upload: &ImageUpload) -> Part {
    let part = || Part::bytes(upload.data.to_vec()).file_name(upload.file_name.clone());

    match upload.content_type.as_deref() {
        Some(content_type) => part().mime_str(content_type).unwrap_or_else(|e| {
            tracing::warn!("Dropping invalid content type {:?}: {}", content_type, e);
            part()
        }),
        None => part(),
    }
}

/// Extracts the `error` field of a JSON error body, or falls back to the raw text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => match json.get("error") {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => "Detail not available".to_string(),
        },
        Err(_) if body.is_empty() => "No additional details.".to_string(),
        Err(_) => body.to_string(),
    }
}
