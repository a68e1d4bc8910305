//! AI-written root-cause diagnoses, cached per signature.
//!
//! Each signature's insight moves `none -> pending -> ready | failed` and back
//! to `pending` when [`FreshnessPolicy`] says the cached row is stale. A named
//! lease per signature keeps two callers from generating the same diagnosis.

pub mod freshness;
pub mod prompt;

use anyhow::{Result, anyhow};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::agents::AgentGateway;
use crate::core::audit::{AuditSink, record_best_effort};
use crate::core::classifier::Classification;
use crate::core::config::Config;
use crate::core::ingest::signature::truncate_chars;
use crate::core::store::{ErrorStore, SignatureAggregate};

pub use freshness::FreshnessPolicy;

pub const DIAGNOSIS_MAX_CHARS: usize = 6000;
pub const FAILURE_REASON_MAX_CHARS: usize = 800;
pub const NO_ELIGIBLE_AGENT: &str = "No eligible analysis agent available";

pub fn lease_name(signature_hash: &str) -> String {
    format!("error-insight:{signature_hash}")
}

/// Everything a diagnosis depends on. Any change here invalidates the cache.
#[derive(Debug, Clone)]
pub struct InsightCandidate {
    pub signature: SignatureAggregate,
    pub classification: Classification,
    pub window_count: i64,
    /// Errors across every signature, ever.
    pub all_time_count: i64,
}

impl InsightCandidate {
    pub fn input_hash(&self) -> String {
        let sig = &self.signature;
        let fields = serde_json::json!([
            sig.signature_hash,
            sig.signature_text,
            sig.last_sample_sanitized,
            sig.last_sample_raw_redacted,
            self.classification.category,
            self.classification.severity.as_str(),
            sig.count.to_string(),
            self.window_count.to_string(),
            self.all_time_count.to_string(),
            sig.last_seen_at.to_string(),
        ]);
        hex::encode(Sha256::digest(fields.to_string().as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightOutcome {
    /// Cached row is still valid; nothing was sent.
    Fresh,
    /// Another caller holds the lease.
    Busy,
    Ready,
    Failed,
}

impl InsightOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightOutcome::Fresh => "fresh",
            InsightOutcome::Busy => "busy",
            InsightOutcome::Ready => "ready",
            InsightOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InsightAttempt {
    pub signature_hash: String,
    pub outcome: InsightOutcome,
}

#[derive(Debug, Clone)]
pub struct InsightSettings {
    pub main_agent: String,
    pub agent_timeout: Duration,
    pub lease_ttl_ms: i64,
    pub freshness: FreshnessPolicy,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl InsightSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            main_agent: config.agents.main_agent.clone(),
            agent_timeout: Duration::from_secs(config.agents.timeout_secs),
            lease_ttl_ms: config.insights.lease_ttl_secs.saturating_mul(1000),
            freshness: FreshnessPolicy::from_config(&config.insights),
        }
    }
}

pub struct InsightGenerator {
    store: ErrorStore,
    agents: Arc<dyn AgentGateway>,
    audit: Arc<dyn AuditSink>,
    settings: InsightSettings,
    holder: String,
}

impl InsightGenerator {
    pub fn new(
        store: ErrorStore,
        agents: Arc<dyn AgentGateway>,
        audit: Arc<dyn AuditSink>,
        settings: InsightSettings,
    ) -> Self {
        Self {
            store,
            agents,
            audit,
            settings,
            holder: format!("errsight-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Generates diagnoses for up to `limit` candidates that need one, in the
    /// order given. Non-actionable and still-fresh candidates are skipped
    /// without using up the batch.
    ///
    /// Agent failures end up as `failed` rows, never as an `Err`. Only store
    /// failures propagate.
    pub async fn generate_batch(
        &self,
        candidates: &[InsightCandidate],
        limit: usize,
    ) -> Result<Vec<InsightAttempt>> {
        let hashes: Vec<String> = candidates
            .iter()
            .map(|c| c.signature.signature_hash.clone())
            .collect();
        let existing = self.store.get_insights(&hashes).await?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut attempts = Vec::new();
        let mut started = 0;
        for candidate in candidates {
            if started >= limit {
                break;
            }
            if !candidate.classification.actionable {
                continue;
            }
            let hash = &candidate.signature.signature_hash;
            let input_hash = candidate.input_hash();
            if !self
                .settings
                .freshness
                .needs_generation(existing.get(hash), &input_hash, now)
            {
                continue;
            }
            started += 1;
            let outcome = self.generate(candidate).await?;
            attempts.push(InsightAttempt {
                signature_hash: hash.clone(),
                outcome,
            });
        }
        Ok(attempts)
    }

    /// Runs one generation under the signature's lease.
    pub async fn generate(&self, candidate: &InsightCandidate) -> Result<InsightOutcome> {
        let hash = &candidate.signature.signature_hash;
        let lease = lease_name(hash);
        let now = chrono::Utc::now().timestamp_millis();
        if !self
            .store
            .try_acquire_lease(&lease, &self.holder, self.settings.lease_ttl_ms, now)
            .await?
        {
            debug!("Insight for {} is already being generated elsewhere", hash);
            return Ok(InsightOutcome::Busy);
        }

        let result = self.generate_locked(candidate).await;

        if let Err(e) = self.store.release_lease(&lease, &self.holder).await {
            warn!("Failed to release insight lease {}: {}", lease, e);
        }
        result
    }

    async fn generate_locked(&self, candidate: &InsightCandidate) -> Result<InsightOutcome> {
        let hash = &candidate.signature.signature_hash;
        let input_hash = candidate.input_hash();

        // Someone may have finished this signature between our read and the lease.
        let existing = self.store.get_insight(hash).await?;
        let now = chrono::Utc::now().timestamp_millis();
        if !self
            .settings
            .freshness
            .needs_generation(existing.as_ref(), &input_hash, now)
        {
            return Ok(InsightOutcome::Fresh);
        }

        self.store.mark_insight_pending(hash, &input_hash, now).await?;

        // One deadline covers agent resolution and the prompt round trip.
        let deadline = tokio::time::Instant::now() + self.settings.agent_timeout;
        let agents = match tokio::time::timeout_at(deadline, self.agents.list_agents()).await {
            Ok(Ok(agents)) => agents,
            Ok(Err(e)) => {
                let reason = format!("Failed to list agents: {e}");
                return self.fail(candidate, &input_hash, &reason, None).await;
            }
            Err(_) => {
                let reason = format!(
                    "Agent list did not answer within {} ms",
                    self.settings.agent_timeout.as_millis()
                );
                return self.fail(candidate, &input_hash, &reason, None).await;
            }
        };
        let Some(agent) = prompt::select_agent(&agents, &self.settings.main_agent) else {
            return self.fail(candidate, &input_hash, NO_ELIGIBLE_AGENT, None).await;
        };

        info!("Generating insight for {} with agent {}", hash, agent.name());
        let text = prompt::build_prompt(candidate);
        let call = self.agents.send_prompt(&agent.id, &text);
        let response = match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(response)) if !response.trim().is_empty() => Ok(response),
            Ok(Ok(_)) => Err(anyhow!("Agent returned an empty response")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!(
                "Agent did not answer within {} ms",
                self.settings.agent_timeout.as_millis()
            )),
        };

        match response {
            Ok(response) => {
                let diagnosis = truncate_chars(response.trim(), DIAGNOSIS_MAX_CHARS);
                let now = chrono::Utc::now().timestamp_millis();
                self.store
                    .mark_insight_ready(hash, &input_hash, &diagnosis, &agent.id, agent.name(), now)
                    .await?;
                record_best_effort(
                    self.audit.as_ref(),
                    "error_insight.ready",
                    &format!("Insight generated for error signature {}", short(hash)),
                    serde_json::json!({
                        "signatureHash": hash,
                        "category": candidate.classification.category,
                        "agentId": agent.id,
                        "agentName": agent.name(),
                    }),
                )
                .await;
                Ok(InsightOutcome::Ready)
            }
            Err(e) => {
                let reason = e.to_string();
                self.fail(candidate, &input_hash, &reason, Some((agent.id.as_str(), agent.name())))
                    .await
            }
        }
    }

    async fn fail(
        &self,
        candidate: &InsightCandidate,
        input_hash: &str,
        reason: &str,
        agent: Option<(&str, &str)>,
    ) -> Result<InsightOutcome> {
        let hash = &candidate.signature.signature_hash;
        let reason = truncate_chars(reason, FAILURE_REASON_MAX_CHARS);
        warn!("Insight generation failed for {}: {}", hash, reason);
        let now = chrono::Utc::now().timestamp_millis();
        self.store
            .mark_insight_failed(hash, input_hash, &reason, agent, now)
            .await?;
        record_best_effort(
            self.audit.as_ref(),
            "error_insight.failed",
            &format!("Insight generation failed for error signature {}", short(hash)),
            serde_json::json!({
                "signatureHash": hash,
                "category": candidate.classification.category,
                "agentId": agent.map(|(id, _)| id),
                "reason": reason,
            }),
        )
        .await;
        Ok(InsightOutcome::Failed)
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
