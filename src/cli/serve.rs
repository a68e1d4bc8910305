use anyhow::Result;
use console::style;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::info;

use crate::core::config::Config;
use crate::core::lifecycle::{LifecycleManager, SyncScheduler};
use crate::core::pipeline::ErrorPipeline;
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::ApiServer;

/// Runs the API server and the scheduled sync until Ctrl+C.
pub(super) async fn run(
    pipeline: Arc<ErrorPipeline>,
    config: &Config,
    log_tx: broadcast::Sender<String>,
) -> Result<()> {
    let mut lifecycle = LifecycleManager::new().await?;

    let sync = SyncScheduler::new(pipeline.clone(), &config.source.sync_cron);
    sync.register(&lifecycle.scheduler).await?;
    lifecycle.attach(Arc::new(Mutex::new(sync)));
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        pipeline.clone(),
        log_tx,
        &config.api.host,
        config.api.port,
    ))));

    lifecycle.start().await?;

    let base = format!("http://{}:{}", config.api.host, config.api.port);
    GuideSection::new("errsight")
        .status("Error log", &pipeline.source_path().display().to_string())
        .status("Sync schedule", &config.source.sync_cron)
        .print();
    println!();
    terminal::print_link("API", &base);
    terminal::print_link("Live logs", &format!("{base}/api/logs"));
    println!(
        "\n  Press {} to stop.\n",
        style("Ctrl+C").bold().yellow()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    lifecycle.shutdown().await
}
