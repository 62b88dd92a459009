use crate::{model_service::ModelError, preprocessing::PreprocessingError, routes::IMAGE_FIELD};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PROCESSING_FAILED: &str = "Internal error while processing the image or running the prediction";
const MODEL_FILE_MISSING: &str = "Internal server error: model file missing";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No image was provided in the \"{}\" field", IMAGE_FIELD)]
    MissingImage,
    #[error("The image file is empty")]
    EmptyImage,
    #[error("Failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Preprocessing failed: {0}")]
    Preprocessing(#[from] PreprocessingError),
    #[error("Model failed: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingImage
            | GatewayError::EmptyImage
            | GatewayError::Multipart(_)
            | GatewayError::Preprocessing(PreprocessingError::EmptyInput) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Preprocessing(_) | GatewayError::Model(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the caller. Server-side details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Preprocessing(PreprocessingError::EmptyInput) => {
                GatewayError::EmptyImage.to_string()
            }
            GatewayError::Model(ModelError::ModelNotFound(_)) => MODEL_FILE_MISSING.to_string(),
            GatewayError::Preprocessing(_) | GatewayError::Model(_) => {
                PROCESSING_FAILED.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_errors_are_client_errors() {
        assert_eq!(GatewayError::MissingImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::EmptyImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::Preprocessing(PreprocessingError::EmptyInput).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_processing_errors_hide_details() {
        let err = GatewayError::Preprocessing(PreprocessingError::Decode("bad png".into()));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), PROCESSING_FAILED);
        assert!(!err.public_message().contains("bad png"));
    }

    #[test]
    fn test_missing_model_has_its_own_message() {
        let err = GatewayError::Model(ModelError::ModelNotFound(PathBuf::from("m.onnx")));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), MODEL_FILE_MISSING);
    }
}
