mod error;
mod inference_service;
mod model_service;
mod ort_service;
mod routes;
mod server;

pub mod config;
pub mod prediction;
pub mod preprocessing;

pub use error::{ErrorBody, GatewayError};
pub use inference_service::InferenceService;
pub use model_service::{ModelError, ModelService};
pub use ort_service::OrtModelService;
pub use routes::IMAGE_FIELD;
pub use server::{build_router, start_server, HttpServer};
