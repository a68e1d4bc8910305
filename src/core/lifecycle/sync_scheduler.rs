use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::LifecycleComponent;
use crate::core::pipeline::ErrorPipeline;

/// Keeps the aggregates current while the service runs: one sync at start,
/// then one per cron tick.
pub struct SyncScheduler {
    pipeline: Arc<ErrorPipeline>,
    cron: String,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(pipeline: Arc<ErrorPipeline>, cron: &str) -> Self {
        Self {
            pipeline,
            cron: cron.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn register(&self, scheduler: &JobScheduler) -> Result<()> {
        let pipeline = self.pipeline.clone();
        let cancel = self.cancel.clone();
        let job = Job::new_async(self.cron.as_str(), move |_uuid, mut _l| {
            let pipeline = pipeline.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                if let Err(e) = pipeline.sync(cancel.child_token()).await {
                    error!("Scheduled error log sync failed: {}", e);
                }
            })
        })?;
        scheduler.add(job).await?;
        info!("Error log sync scheduled on '{}'", self.cron);
        Ok(())
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for SyncScheduler {
    async fn on_start(&mut self) -> Result<()> {
        // A failed first pass is retried on the next tick.
        if let Err(e) = self.pipeline.sync(self.cancel.child_token()).await {
            warn!("Initial error log sync failed: {}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}
