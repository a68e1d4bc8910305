mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::lifecycle::LifecycleComponent;
use crate::core::pipeline::ErrorPipeline;

pub struct ApiServer {
    pipeline: Arc<ErrorPipeline>,
    log_tx: broadcast::Sender<String>,
    api_host: String,
    api_port: u16,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pipeline: Arc<ErrorPipeline>,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) api_port: u16,
}

impl ApiServer {
    pub fn new(
        pipeline: Arc<ErrorPipeline>,
        log_tx: broadcast::Sender<String>,
        api_host: &str,
        api_port: u16,
    ) -> Self {
        Self {
            pipeline,
            log_tx,
            api_host: api_host.to_string(),
            api_port,
            shutdown: CancellationToken::new(),
        }
    }
}

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        // Bind here so a taken port fails startup instead of a background task.
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {addr}"))?;

        let state = AppState {
            pipeline: self.pipeline.clone(),
            log_tx: self.log_tx.clone(),
            api_port: self.api_port,
        };
        let app = router::build_api_router(state);
        let shutdown = self.shutdown.clone();

        info!("API Server running at http://{addr}");
        tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        Ok(())
    }
}
