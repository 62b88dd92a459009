use crate::config::{Config, GatewayConfig, StorageConfig};
use crate::prediction::PredictionService;
use crate::repository::{
    InMemoryPredictionRepository, PredictionRepository, SqlitePredictionRepository,
};
use crate::server::HttpServer;
use crate::storage::ImageStore;
use crate::submission::SubmissionService;

use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let repository = match connect_repository(&config.storage).await {
        Ok(repository) => repository,
        Err(e) => {
            tracing::error!("Failed to initialize prediction repository: {:?}", e);
            return Err(e);
        }
    };

    let prediction_service = match build_prediction_service(&config.gateway) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize prediction service client: {:?}", e);
            return Err(e);
        }
    };

    let submission_service = Arc::new(SubmissionService::new(
        prediction_service,
        ImageStore::new(&config.storage.media_dir),
        repository,
    ));

    let server = HttpServer::new(submission_service, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn connect_repository(
    storage: &StorageConfig,
) -> anyhow::Result<Arc<dyn PredictionRepository>> {
    if storage.is_in_memory() {
        tracing::warn!("Using in-memory prediction storage; records are lost on restart");
        return Ok(Arc::new(InMemoryPredictionRepository::new()));
    }

    let repository = SqlitePredictionRepository::connect(&storage.database_url).await?;
    Ok(Arc::new(repository))
}

/// Submissions are still accepted without a gateway URL; each one then fails
/// with a configuration message.
fn build_prediction_service(gateway: &GatewayConfig) -> anyhow::Result<Option<PredictionService>> {
    match &gateway.url {
        Some(url) => {
            tracing::info!("Using prediction service at {}", url);
            Ok(Some(PredictionService::new(url.clone(), gateway.get_timeout())?))
        }
        None => {
            tracing::error!("No prediction service URL configured (gateway.url or MODEL_API_URL)");
            Ok(None)
        }
    }
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
