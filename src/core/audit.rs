use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::core::store::ErrorStore;

/// Human-readable activity log. The pipeline never lets a failure here
/// reach its caller; see [`record_best_effort`].
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, kind: &str, message: &str, payload: serde_json::Value) -> Result<()>;
}

pub struct StoreAuditSink {
    store: ErrorStore,
}

impl StoreAuditSink {
    pub fn new(store: ErrorStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, kind: &str, message: &str, payload: serde_json::Value) -> Result<()> {
        self.store.add_activity(kind, message, &payload).await?;
        Ok(())
    }
}

pub async fn record_best_effort(
    sink: &dyn AuditSink,
    kind: &str,
    message: &str,
    payload: serde_json::Value,
) {
    if let Err(e) = sink.record(kind, message, payload).await {
        warn!("Audit event '{}' dropped: {}", kind, e);
    }
}
