use crate::{
    form::ImageUpload,
    page::{MessageLevel, Page, PredictionView},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    response::Html,
};
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

const INVALID_FORM_MESSAGE: &str = "Please correct the errors in the form.";
const SUCCESS_MESSAGE: &str = "Prediction completed successfully.";

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    prediction: Option<String>,
}

#[instrument(skip(state))]
pub async fn index(State(state): State<SharedState>, Query(query): Query<PageQuery>) -> Html<String> {
    state.metrics.record_request("/");

    Html(Page::new(query.prediction).render())
}

/// Validates the uploaded form, then hands the image to the submission
/// service. Every outcome re-renders the upload page.
#[instrument(skip(state, multipart))]
pub async fn submit(
    State(state): State<SharedState>,
    Query(query): Query<PageQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Html<String> {
    state.metrics.record_request("/");
    let started = Instant::now();
    let page = Page::new(query.prediction);

    let upload = match ImageUpload::from_request(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid prediction form");
            state
                .metrics
                .record_submission("invalid_form", started.elapsed().as_millis() as u64);
            return Html(
                page.with_message(MessageLevel::Warning, INVALID_FORM_MESSAGE)
                    .with_form_error(e)
                    .render(),
            );
        }
    };

    let page = match state.submission_service.submit(&upload).await {
        Ok(submission) => {
            state
                .metrics
                .record_submission("success", started.elapsed().as_millis() as u64);
            page.with_message(MessageLevel::Success, SUCCESS_MESSAGE)
                .with_prediction(PredictionView {
                    predicted_class: submission.record.predicted_class,
                    confidence: submission.record.confidence,
                    image_url: submission.image_url,
                })
        }
        Err(e) => {
            state
                .metrics
                .record_submission(e.outcome(), started.elapsed().as_millis() as u64);
            page.with_message(MessageLevel::Error, e.user_message())
        }
    };

    Html(page.render())
}
