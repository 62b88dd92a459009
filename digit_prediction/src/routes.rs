use crate::{
    error::GatewayError, inference_service::InferenceService, model_service::ModelService,
    prediction::PredictionResult,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "imagen";

#[instrument(skip(inference_service, multipart))]
pub async fn predict<M: ModelService>(
    State(inference_service): State<InferenceService<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    tracing::info!("Prediction request received");

    // a body that is not multipart carries no `imagen` file at all
    let mut multipart = multipart.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Request is not a multipart upload");
        GatewayError::MissingImage
    })?;

    let image_data = read_image_field(&mut multipart).await?;
    let prediction = inference_service.predict(&image_data).await?;

    Ok(Json(prediction))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, GatewayError> {
    while let Some(field) = multipart.next_field().await.inspect_err(|e| {
        tracing::warn!(error = %e, "Malformed multipart body");
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        tracing::debug!(
            file_name = ?field.file_name(),
            content_type = ?field.content_type(),
            "Received image upload"
        );

        let image_data = field.bytes().await?;
        if image_data.is_empty() {
            tracing::warn!("Received an empty image file");
            return Err(GatewayError::EmptyImage);
        }
        return Ok(image_data);
    }

    tracing::warn!("Request without a file in the {:?} field", IMAGE_FIELD);
    Err(GatewayError::MissingImage)
}

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
    })
}
