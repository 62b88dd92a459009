use crate::{
    config::ServerConfig, routes::api_routes, submission::SubmissionService,
    submission::MEDIA_URL_PREFIX, telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};

#[derive(Clone)]
pub struct SharedState {
    pub submission_service: Arc<SubmissionService>,
    pub metrics: Arc<Metrics>,
}

/// Upload page, health and metrics routes, plus the stored uploads under
/// `/media`.
pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    let media_dir = state.submission_service.image_store().media_dir().to_path_buf();
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .nest_service(MEDIA_URL_PREFIX, ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        submission_service: Arc<SubmissionService>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = config.get_address();

        let app_state = SharedState {
            submission_service,
            metrics: Arc::new(Metrics::new()?),
        };
        let router = build_router(app_state, config.max_upload_bytes);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok::<(), anyhow::Error>(())
        });

        Ok(server_handle)
    }
}
