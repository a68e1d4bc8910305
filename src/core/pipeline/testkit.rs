use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use super::{Collaborators, ErrorPipeline};
use crate::core::agents::{AgentDescriptor, AgentGateway};
use crate::core::audit::StoreAuditSink;
use crate::core::config::Config;
use crate::core::ingest::SignatureNormalizer;
use crate::core::store::{ErrorStore, test_store};
use crate::core::work::LocalWorkTracker;

/// Agent gateway with one agent, "main", that answers every prompt with the
/// same text.
pub(crate) struct FakeAgents {
    reply: String,
    calls: AtomicUsize,
}

impl FakeAgents {
    pub(crate) fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentGateway for FakeAgents {
    async fn list_agents(&self) -> Result<Vec<AgentDescriptor>> {
        Ok(vec![AgentDescriptor::named("main")])
    }

    async fn send_prompt(&self, _agent_id: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// A pipeline over an in-memory store and a log file in a temp dir.
pub(crate) struct Harness {
    pub(crate) _dir: TempDir,
    pub(crate) log_path: PathBuf,
    pub(crate) store: ErrorStore,
    pub(crate) agents: Arc<FakeAgents>,
    pub(crate) pipeline: Arc<ErrorPipeline>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::build(None, |_| {}).await
    }

    pub(crate) async fn with_normalizer(normalizer: Arc<dyn SignatureNormalizer>) -> Self {
        Self::build(Some(normalizer), |_| {}).await
    }

    pub(crate) async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(None, tweak).await
    }

    async fn build(
        normalizer: Option<Arc<dyn SignatureNormalizer>>,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        tweak(&mut config);
        let log_path = config.log_path();
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();

        let store = test_store().await;
        let agents = FakeAgents::replying("## Likely Cause\nThe database is down.");
        let collaborators = Collaborators {
            agents: agents.clone(),
            work: Arc::new(LocalWorkTracker::new(store.clone())),
            audit: Arc::new(StoreAuditSink::new(store.clone())),
        };
        let mut pipeline = ErrorPipeline::new(store.clone(), &config, collaborators);
        if let Some(normalizer) = normalizer {
            pipeline = pipeline.with_normalizer(normalizer);
        }
        let pipeline = Arc::new(pipeline);
        Self {
            _dir: dir,
            log_path,
            store,
            agents,
            pipeline,
        }
    }

    pub(crate) fn append(&self, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    /// Replaces the log with a new file (new inode), the way rotation does.
    pub(crate) fn rotate(&self, text: &str) {
        let next = self.log_path.with_extension("next");
        std::fs::write(&next, text).unwrap();
        std::fs::rename(&next, &self.log_path).unwrap();
    }
}

/// One error line stamped `at`.
pub(crate) fn line_at(at: DateTime<Utc>, message: &str) -> String {
    format!("{} ERROR {}\n", at.to_rfc3339(), message)
}

/// One error line stamped now.
pub(crate) fn line(message: &str) -> String {
    line_at(Utc::now(), message)
}
