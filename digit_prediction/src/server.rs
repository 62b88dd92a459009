use crate::{
    config::{Config, ServerConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::{healthcheck, predict},
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};

pub fn build_router<M: ModelService>(model_service: M, max_upload_bytes: usize) -> Router {
    let inference_service = InferenceService::new(model_service);

    Router::new()
        .route("/predict", post(predict::<M>))
        .route("/health", get(healthcheck))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(inference_service)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model_service: impl ModelService,
        config: &ServerConfig,
    ) -> std::io::Result<Self> {
        let router = build_router(model_service, config.max_upload_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> std::io::Result<()> {
        tracing::info!(
            "Prediction gateway listening on {}",
            self.listener.local_addr()?
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown")
            })
            .await
    }
}

/// Loads the classifier before binding, so a missing or broken model stops the
/// process before any request is accepted.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let ort_model_service = OrtModelService::new(&config.model)?;

    let http_server = HttpServer::new(ort_model_service, &config.server).await?;
    http_server.run().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
