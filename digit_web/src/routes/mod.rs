mod health;
mod metrics;
mod predictions;

use crate::server::SharedState;
use axum::{routing::get, Router};

use health::healthcheck;
use metrics::metrics_handler;
use predictions::{index, submit};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
}
